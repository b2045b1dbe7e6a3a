use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lorasense_core::protocol::MAX_FRAME_SIZE;
use tokio::sync::broadcast;

use crate::{Radio, TransportError};

#[derive(Debug, Clone)]
struct Transmission {
    station: usize,
    frame: Vec<u8>,
}

/// A shared in-memory radio channel.
///
/// Every attached station hears every frame sent by the others. Frames can
/// be dropped on reception with a fixed probability to mimic a lossy link.
#[derive(Clone)]
pub struct Ether {
    tx: broadcast::Sender<Transmission>,
    next_station: Arc<AtomicUsize>,
    loss_rate: f64,
}

impl Ether {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);

        Self {
            tx,
            next_station: Arc::new(AtomicUsize::new(0)),
            loss_rate: 0.0,
        }
    }

    /// Probability in `0.0..=1.0` that a station misses a given frame.
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn attach(&self) -> EtherRadio {
        EtherRadio {
            station: self.next_station.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            loss_rate: self.loss_rate,
        }
    }
}

impl Default for Ether {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct EtherRadio {
    station: usize,
    tx: broadcast::Sender<Transmission>,
    rx: broadcast::Receiver<Transmission>,
    loss_rate: f64,
}

impl EtherRadio {
    fn lost(&self) -> bool {
        self.loss_rate > 0.0 && rand::random::<f64>() < self.loss_rate
    }
}

#[async_trait]
impl Radio for EtherRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // Nobody listening is not an error on a broadcast medium.
        let _ = self.tx.send(Transmission {
            station: self.station,
            frame: frame.to_vec(),
        });

        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(tx) if tx.station == self.station => continue,
                Ok(_) if self.lost() => {
                    tracing::trace!(station = self.station, "frame lost in the ether");
                }
                Ok(tx) => return Ok(tx.frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        station = self.station,
                        skipped,
                        "receiver lagged, frames missed"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn frames_reach_every_other_station() {
        let ether = Ether::default();
        let mut a = ether.attach();
        let mut b = ether.attach();
        let mut c = ether.attach();

        a.send(&[1, 0, 0, 1, 0, 0, 0]).await.unwrap();

        assert_eq!(b.receive().await.unwrap(), vec![1, 0, 0, 1, 0, 0, 0]);
        assert_eq!(c.receive().await.unwrap(), vec![1, 0, 0, 1, 0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn sender_does_not_hear_itself() {
        let ether = Ether::default();
        let mut a = ether.attach();
        let _b = ether.attach();

        a.send(&[0, 1, 1]).await.unwrap();

        let heard = tokio::time::timeout(Duration::from_secs(1), a.receive()).await;
        assert!(heard.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn total_loss_drops_everything() {
        let ether = Ether::default().with_loss_rate(1.0);
        let mut a = ether.attach();
        let mut b = ether.attach();

        for _ in 0..10 {
            a.send(&[0, 1, 1]).await.unwrap();
        }

        let heard = tokio::time::timeout(Duration::from_secs(1), b.receive()).await;
        assert!(heard.is_err());
    }

    #[tokio::test]
    async fn oversized_frames_are_refused() {
        let ether = Ether::default();
        let mut a = ether.attach();

        let err = a.send(&vec![0; MAX_FRAME_SIZE + 1]).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { .. }));
    }
}
