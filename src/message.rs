use crate::error::Error;
use crate::frame::{Frame, OpCode};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame.opcode {
            OpCode::Text => Ok(Message::Text(String::from_utf8(frame.payload)?)),
            OpCode::Binary => Ok(Message::Binary(frame.payload)),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
        }
    }

    pub fn as_text(&self) -> Result<String, Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Binary(data) => Ok(String::from_utf8(data.clone())?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_becomes_text_message() {
        let frame = Frame::new(true, OpCode::Text, b"hello".to_vec(), false);
        let message = Message::from_frame(frame).unwrap();
        assert_eq!(message, Message::Text("hello".to_string()));
    }

    #[test]
    fn binary_frame_becomes_binary_message() {
        let frame = Frame::new(true, OpCode::Binary, vec![1, 2, 3], false);
        let message = Message::from_frame(frame).unwrap();
        assert_eq!(message, Message::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn invalid_utf8_text_frame_errors() {
        let frame = Frame::new(true, OpCode::Text, vec![0xff, 0xfe], false);
        assert!(Message::from_frame(frame).is_err());
    }

    #[test]
    fn control_opcode_is_not_a_message() {
        let frame = Frame::new(true, OpCode::Ping, Vec::new(), false);
        assert!(matches!(
            Message::from_frame(frame),
            Err(Error::InvalidOpcode)
        ));
    }
}
