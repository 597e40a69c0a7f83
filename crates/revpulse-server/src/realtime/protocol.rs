//! Wire messages for the realtime WebSocket channel.
//!
//! Clients subscribe to entity topics by place id; the server acknowledges
//! each (un)subscribe and pushes `review.new` / `review.error` frames for
//! subscribed topics. All frames are JSON text messages tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "placeId")]
        place_id: String,
    },
    Unsubscribe {
        #[serde(rename = "placeId")]
        place_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "subscribed")]
    Subscribed {
        #[serde(rename = "placeId")]
        place_id: String,
    },
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        #[serde(rename = "placeId")]
        place_id: String,
    },
    #[serde(rename = "review.new")]
    ReviewNew {
        #[serde(rename = "placeId")]
        place_id: String,
        data: Value,
    },
    #[serde(rename = "review.error")]
    ReviewError {
        #[serde(rename = "placeId")]
        place_id: String,
        data: ErrorData,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorData {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","placeId":"e1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                place_id: "e1".to_owned()
            }
        );
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn review_new_frame_serializes_with_dotted_type() {
        let frame = ServerMessage::ReviewNew {
            place_id: "e1".to_owned(),
            data: serde_json::json!({"reviewId": "google:abc"}),
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "review.new");
        assert_eq!(json["placeId"], "e1");
        assert_eq!(json["data"]["reviewId"], "google:abc");
    }

    #[test]
    fn review_error_frame_carries_the_message() {
        let frame = ServerMessage::ReviewError {
            place_id: "e1".to_owned(),
            data: ErrorData {
                message: "quota exhausted".to_owned(),
            },
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "review.error");
        assert_eq!(json["data"]["message"], "quota exhausted");
    }
}
