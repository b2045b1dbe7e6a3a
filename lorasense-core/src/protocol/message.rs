use super::{
    CAPABILITY_BITMAP_LEN, MessageType, Packet, PayloadError, decode_capabilities,
    decode_reading, encode_capabilities, encode_reading,
};
use crate::{BASESTATION_ID, Capabilities, GpsFix, NodeId, SensorKind, SensorReading, SensorValue};

/// A packet with its payload interpreted according to its message type.
///
/// Every message travels between the basestation and one node; `node` is
/// always the non-basestation end of that exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    JoinRequest {
        node: NodeId,
        capabilities: Capabilities,
    },
    JoinAck {
        node: NodeId,
    },
    SensorRequest {
        node: NodeId,
        kind: SensorKind,
    },
    SensorResponse {
        node: NodeId,
        value: SensorValue,
        position: Option<GpsFix>,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::JoinRequest { .. } => MessageType::JoinRequest,
            Message::JoinAck { .. } => MessageType::JoinAck,
            Message::SensorRequest { .. } => MessageType::SensorRequest,
            Message::SensorResponse { .. } => MessageType::SensorResponse,
        }
    }

    pub fn node(&self) -> NodeId {
        match *self {
            Message::JoinRequest { node, .. }
            | Message::JoinAck { node }
            | Message::SensorRequest { node, .. }
            | Message::SensorResponse { node, .. } => node,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let (source, dest, payload) = match self {
            Message::JoinRequest { node, capabilities } => (
                *node,
                BASESTATION_ID,
                encode_capabilities(*capabilities).to_vec(),
            ),
            Message::JoinAck { node } => (BASESTATION_ID, *node, Vec::new()),
            Message::SensorRequest { node, kind } => (BASESTATION_ID, *node, vec![*kind as u8]),
            Message::SensorResponse {
                node,
                value,
                position,
            } => (*node, BASESTATION_ID, encode_reading(value, position.as_ref())),
        };

        Packet::from_parts(source, dest, self.message_type(), payload)
    }

    /// Interprets a packet's payload.
    ///
    /// The node id is taken from whichever header field is not the
    /// basestation's side of the exchange; addressing is not checked here.
    pub fn from_packet(packet: &Packet) -> Result<Self, PayloadError> {
        let payload = packet.payload();
        let message_type = packet.message_type();

        let expect_len = |expected: usize| {
            if payload.len() == expected {
                Ok(())
            } else {
                Err(PayloadError::InvalidLength {
                    message_type,
                    expected,
                    actual: payload.len(),
                })
            }
        };

        match message_type {
            MessageType::JoinRequest => {
                expect_len(CAPABILITY_BITMAP_LEN)?;
                let mut bitmap = [0u8; CAPABILITY_BITMAP_LEN];
                bitmap.copy_from_slice(payload);

                Ok(Message::JoinRequest {
                    node: packet.source(),
                    capabilities: decode_capabilities(bitmap)?,
                })
            }
            MessageType::JoinAck => {
                expect_len(0)?;
                Ok(Message::JoinAck {
                    node: packet.dest(),
                })
            }
            MessageType::SensorRequest => {
                expect_len(1)?;
                Ok(Message::SensorRequest {
                    node: packet.dest(),
                    kind: SensorKind::try_from(payload[0])?,
                })
            }
            MessageType::SensorResponse => {
                let (value, position) = decode_reading(payload)?;
                Ok(Message::SensorResponse {
                    node: packet.source(),
                    value,
                    position,
                })
            }
        }
    }

    /// Builds the response a node sends for `reading`.
    pub fn response(node: NodeId, reading: &SensorReading) -> Self {
        Message::SensorResponse {
            node,
            value: reading.value,
            position: reading.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(kinds: &[SensorKind]) -> Capabilities {
        kinds.iter().copied().collect()
    }

    #[test]
    fn join_request_frame() {
        let message = Message::JoinRequest {
            node: 1,
            capabilities: caps(&[SensorKind::Temperature, SensorKind::Humidity]),
        };

        let frame = message.to_packet().encode();
        assert_eq!(frame, vec![1, 0, 0, 1, 1, 0, 0]);

        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(Message::from_packet(&packet), Ok(message));
    }

    #[test]
    fn join_ack_frame() {
        let frame = Message::JoinAck { node: 1 }.to_packet().encode();
        assert_eq!(frame, vec![0, 1, 1]);
    }

    #[test]
    fn sensor_request_frame() {
        let message = Message::SensorRequest {
            node: 1,
            kind: SensorKind::Temperature,
        };
        assert_eq!(message.to_packet().encode(), vec![0, 1, 3, 0]);
    }

    #[test]
    fn sensor_response_carries_reading() {
        let message = Message::SensorResponse {
            node: 1,
            value: SensorValue::temperature(21.5),
            position: GpsFix::from_degrees(55.944_756, -3.189_028),
        };

        let packet = message.to_packet();
        assert_eq!(packet.source(), 1);
        assert_eq!(packet.dest(), BASESTATION_ID);
        assert_eq!(
            packet.payload().len(),
            super::super::reading_payload_len(SensorKind::Temperature)
        );

        let decoded = Message::from_packet(&Packet::decode(&packet.encode()).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn payload_lengths_are_enforced_per_type() {
        let cases = [
            (MessageType::JoinRequest, vec![1, 0, 0], 4),
            (MessageType::JoinAck, vec![0], 0),
            (MessageType::SensorRequest, vec![], 1),
            (MessageType::SensorRequest, vec![0, 1], 1),
        ];

        for (message_type, payload, expected) in cases {
            let actual = payload.len();
            let packet = Packet::new(1, 0, message_type, payload).unwrap();

            assert_eq!(
                Message::from_packet(&packet),
                Err(PayloadError::InvalidLength {
                    message_type,
                    expected,
                    actual,
                })
            );
        }
    }

    #[test]
    fn unknown_sensor_kind_in_request() {
        let packet = Packet::new(0, 4, MessageType::SensorRequest, [9]).unwrap();
        assert_eq!(
            Message::from_packet(&packet),
            Err(PayloadError::InvalidSensorKind(9))
        );
    }
}
