//! Tests for message types and domain identifiers.

use super::*;

// ============================================================================
// QueueName Tests
// ============================================================================

mod queue_name_tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        for name in ["q1", "orders", "orders.incoming", "a_b-c", "Q.1-x_2"] {
            assert!(QueueName::new(name.to_string()).is_ok(), "rejected {name}");
        }
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(QueueName::new(String::new()).is_err());
    }

    #[test]
    fn test_rejects_overlong_name() {
        let name = "q".repeat(261);
        assert!(QueueName::new(name).is_err());
    }

    #[test]
    fn test_rejects_invalid_characters() {
        for name in ["has space", "slash/name", "emoji🦀", "semi;colon"] {
            assert!(QueueName::new(name.to_string()).is_err(), "accepted {name}");
        }
    }

    #[test]
    fn test_rejects_leading_and_trailing_hyphens() {
        assert!(QueueName::new("-queue".to_string()).is_err());
        assert!(QueueName::new("queue-".to_string()).is_err());
    }

    #[test]
    fn test_from_str_round_trip() {
        let queue: QueueName = "orders.incoming".parse().unwrap();
        assert_eq!(queue.as_str(), "orders.incoming");
        assert_eq!(queue.to_string(), "orders.incoming");
    }
}

// ============================================================================
// MessageId Tests
// ============================================================================

mod message_id_tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_str_rejects_empty() {
        assert!("".parse::<MessageId>().is_err());
        assert!("abc".parse::<MessageId>().is_ok());
    }
}

// ============================================================================
// Selector Tests
// ============================================================================

mod selector_tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parses_simple_equality() {
        let selector = Selector::parse("color = 'red'").unwrap();
        assert_eq!(selector.attribute(), "color");
        assert_eq!(selector.to_string(), "color = 'red'");
    }

    #[test]
    fn test_parses_without_surrounding_spaces() {
        let selector = Selector::parse("color='red'").unwrap();
        assert_eq!(selector.attribute(), "color");
    }

    #[test]
    fn test_rejects_missing_equals() {
        assert!(Selector::parse("color 'red'").is_err());
    }

    #[test]
    fn test_rejects_unquoted_value() {
        assert!(Selector::parse("color = red").is_err());
    }

    #[test]
    fn test_rejects_bad_attribute() {
        assert!(Selector::parse(" = 'red'").is_err());
        assert!(Selector::parse("co lor = 'red'").is_err());
    }

    #[test]
    fn test_matches_attribute_equality() {
        let selector = Selector::parse("region = 'emea'").unwrap();

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), "emea".to_string());
        assert!(selector.matches(&attributes));

        attributes.insert("region".to_string(), "apac".to_string());
        assert!(!selector.matches(&attributes));

        assert!(!selector.matches(&HashMap::new()));
    }
}

// ============================================================================
// Message Tests
// ============================================================================

mod message_tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let message = Message::new("payload".into())
            .with_attribute("kind".to_string(), "order".to_string())
            .with_correlation_id("corr-1".to_string());

        assert_eq!(&message.body[..], b"payload");
        assert_eq!(message.attributes.get("kind"), Some(&"order".to_string()));
        assert_eq!(message.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn test_body_serializes_as_base64() {
        let message = Message::new("hello".into());
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("aGVsbG8="), "body should be base64: {json}");

        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(&back.body[..], b"hello");
    }
}

// ============================================================================
// Receipt Tests
// ============================================================================

mod receipt_tests {
    use super::*;

    #[test]
    fn test_receipt_exposes_queue_and_sequence() {
        let queue = QueueName::new("q1".to_string()).unwrap();
        let receipt = Receipt::new(queue.clone(), 42);
        assert_eq!(receipt.queue_name(), &queue);
        assert_eq!(receipt.sequence(), 42);
    }
}
