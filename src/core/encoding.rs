//! Binary encoding/decoding of node messages.
//!
//! Nodes may run in separate processes, so every message crosses an edge by
//! value. Rules never travel as live objects; they travel as canonical text.

use crate::core::message::Message;
use crate::error::ProcessError;

/// Encode a message into a byte buffer
pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProcessError> {
    bincode::serialize(message).map_err(|e| ProcessError::Codec(e.to_string()))
}

/// Decode a byte buffer into a message
pub fn decode_message(bytes: &[u8]) -> Result<Message, ProcessError> {
    bincode::deserialize(bytes).map_err(|e| ProcessError::Codec(e.to_string()))
}

/// Encode then decode, as a message would be on a real wire.
pub fn over_the_wire(message: &Message) -> Result<Message, ProcessError> {
    decode_message(&encode_message(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binding::Binding;
    use crate::core::message::{BindingMessage, FactMessage, GraphRef, Meta};
    use crate::core::term::{Functor, Term, Triple};

    #[test]
    fn test_binding_message_survives_the_wire() {
        let fact = Triple::new(
            Term::uri("http://example.org/a"),
            Term::uri("http://example.org/p"),
            Term::Functor(Functor::new("pair", vec![Term::literal("x"), Term::blank("b0")])),
        );
        let msg = Message::Binding(BindingMessage::new(
            Meta::added(GraphRef::of(fact.clone()), 42),
            Binding::new(vec![fact.subject.clone(), fact.object.clone()]),
        ));
        assert_eq!(over_the_wire(&msg).unwrap(), msg);

        let fact_msg = Message::Fact(FactMessage::assert(fact, 7));
        assert_eq!(over_the_wire(&fact_msg).unwrap(), fact_msg);
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        let err = decode_message(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, ProcessError::Codec(_)));
    }
}
