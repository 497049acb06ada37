#[cfg(test)]
mod tests {
    use crate::types::{EntityKind, MessageType, UpdateType};
    use crate::{ParseError, ServerEvent, parse_server_event};

    #[test]
    fn test_parse_new_message() {
        let frame = r#"{
            "event": "new_message",
            "data": {
                "id": "m42",
                "roomId": "squad-7",
                "authorId": "u1",
                "content": "hi",
                "messageType": "text",
                "createdAt": "2025-03-01T12:00:00Z",
                "correlationId": "c1"
            }
        }"#;

        let event = parse_server_event(frame).unwrap();
        let ServerEvent::NewMessage(record) = event else {
            panic!("expected NewMessage, got {event:?}");
        };

        assert_eq!(record.id, "m42");
        assert_eq!(record.room_id, "squad-7");
        assert_eq!(record.author_id, "u1");
        assert_eq!(record.message_type, MessageType::Text);
        assert_eq!(record.correlation_id.as_deref(), Some("c1"));
        assert!(!record.edited);
    }

    #[test]
    fn test_parse_new_message_without_correlation() {
        let frame = r#"{
            "event": "new_message",
            "data": {"id": "m1", "roomId": "r", "authorId": "u2", "content": "yo"}
        }"#;

        let ServerEvent::NewMessage(record) = parse_server_event(frame).unwrap() else {
            panic!("expected NewMessage");
        };

        assert_eq!(record.correlation_id, None);
        assert_eq!(record.message_type, MessageType::Text);
    }

    #[test]
    fn test_parse_new_message_missing_content() {
        let frame = r#"{"event": "new_message", "data": {"id": "m1", "roomId": "r", "authorId": "u"}}"#;
        let result = parse_server_event(frame);

        assert!(matches!(result, Err(ParseError::MissingField(field)) if field == "content"));
    }

    #[test]
    fn test_parse_project_like_update() {
        let frame = r#"{
            "event": "project_update",
            "data": {"type": "LIKE_UPDATE", "projectId": "p9", "likeCount": 5, "likedBy": "u3", "liked": true}
        }"#;

        let ServerEvent::Counter(update) = parse_server_event(frame).unwrap() else {
            panic!("expected Counter");
        };

        assert_eq!(update.entity_kind, EntityKind::Project);
        assert_eq!(update.update_type, UpdateType::LikeUpdate);
        assert_eq!(update.entity_id, "p9");
        assert_eq!(update.count, 5);
        assert_eq!(update.actor_id, "u3");
        assert_eq!(update.actor_state, Some(true));
        assert_eq!(update.seq, None);
    }

    #[test]
    fn test_parse_counter_generic_field_names() {
        let frame = r#"{
            "event": "challenge_update",
            "data": {"type": "NEW_COMMENT", "entityId": "ch2", "count": 12, "actorId": "u8", "seq": 4}
        }"#;

        let ServerEvent::Counter(update) = parse_server_event(frame).unwrap() else {
            panic!("expected Counter");
        };

        assert_eq!(update.entity_kind, EntityKind::Challenge);
        assert_eq!(update.update_type, UpdateType::NewComment);
        assert_eq!(update.entity_id, "ch2");
        assert_eq!(update.count, 12);
        assert_eq!(update.actor_state, None);
        assert_eq!(update.seq, Some(4));
    }

    #[test]
    fn test_parse_counter_unrecognized_type() {
        let frame = r#"{
            "event": "squad_update",
            "data": {"type": "BANANA_UPDATE", "squadId": "s1", "count": 1, "actorId": "u"}
        }"#;

        assert!(matches!(
            parse_server_event(frame),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_user_typing() {
        let frame = r#"{"event": "userTyping", "data": {"roomId": "squad-7", "userId": "u5"}}"#;

        assert_eq!(
            parse_server_event(frame).unwrap(),
            ServerEvent::UserTyping {
                room_id: "squad-7".into(),
                user_id: "u5".into()
            }
        );
    }

    #[test]
    fn test_parse_user_stopped_typing() {
        let frame = r#"{"event": "userStoppedTyping", "data": {"roomId": "squad-7", "userId": "u5"}}"#;

        assert_eq!(
            parse_server_event(frame).unwrap(),
            ServerEvent::UserStoppedTyping {
                room_id: "squad-7".into(),
                user_id: "u5".into()
            }
        );
    }

    #[test]
    fn test_parse_squad_joined() {
        let frame = r#"{"event": "squad_joined", "data": {"roomId": "squad-7"}}"#;

        assert_eq!(
            parse_server_event(frame).unwrap(),
            ServerEvent::SquadJoined {
                room_id: "squad-7".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown_event() {
        let frame = r#"{"event": "server_restarting", "data": {}}"#;
        let result = parse_server_event(frame);

        assert!(matches!(result, Err(ParseError::UnknownEvent(name)) if name == "server_restarting"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_server_event("not json"),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_empty_frame() {
        assert!(matches!(parse_server_event("  "), Err(ParseError::EmptyFrame)));
    }

    #[test]
    fn test_parse_missing_event_name() {
        let frame = r#"{"data": {}}"#;

        assert!(matches!(
            parse_server_event(frame),
            Err(ParseError::MissingField(field)) if field == "event"
        ));
    }
}
