// Channel envelopes for chat webhooks

use crate::models::TargetType;
use serde_json::{json, Value};

/// Field whose presence marks a payload as already shaped for the channel
pub fn marker_field(target_type: TargetType) -> Option<&'static str> {
    match target_type {
        TargetType::Webhook => None,
        TargetType::Dingtalk => Some("msgtype"),
        TargetType::Feishu => Some("msg_type"),
        TargetType::Slack => Some("text"),
    }
}

/// True when `payload` already carries the channel's marker field
pub fn is_enveloped(target_type: TargetType, payload: &Value) -> bool {
    match marker_field(target_type) {
        Some(marker) => payload.get(marker).is_some(),
        None => true,
    }
}

/// Wrap a payload into the envelope the channel expects
pub fn wrap_payload(target_type: TargetType, payload: Value) -> Value {
    if is_enveloped(target_type, &payload) {
        return payload;
    }

    let text = payload_text(&payload);
    match target_type {
        TargetType::Webhook => payload,
        TargetType::Dingtalk => json!({
            "msgtype": "text",
            "text": { "content": text }
        }),
        TargetType::Feishu => json!({
            "msg_type": "text",
            "content": { "text": text }
        }),
        TargetType::Slack => json!({ "text": text }),
    }
}

/// Strings are sent as-is; anything else is pretty-printed JSON
fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_is_untouched() {
        let payload = json!({"items": [1, 2]});
        assert_eq!(wrap_payload(TargetType::Webhook, payload.clone()), payload);
    }

    #[test]
    fn test_dingtalk_wraps_text() {
        let wrapped = wrap_payload(TargetType::Dingtalk, json!("hello"));
        assert_eq!(
            wrapped,
            json!({"msgtype": "text", "text": {"content": "hello"}})
        );
    }

    #[test]
    fn test_feishu_wraps_json_as_pretty_text() {
        let wrapped = wrap_payload(TargetType::Feishu, json!({"a": 1}));
        assert_eq!(wrapped["msg_type"], json!("text"));
        assert_eq!(wrapped["content"]["text"], json!("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_slack_wraps_text() {
        let wrapped = wrap_payload(TargetType::Slack, json!({"n": 3}));
        assert!(wrapped["text"].is_string());
    }

    #[test]
    fn test_already_enveloped_payload_passes_through() {
        let dingtalk = json!({"msgtype": "markdown", "markdown": {"title": "t", "text": "x"}});
        assert_eq!(wrap_payload(TargetType::Dingtalk, dingtalk.clone()), dingtalk);

        let feishu = json!({"msg_type": "post", "content": {}});
        assert_eq!(wrap_payload(TargetType::Feishu, feishu.clone()), feishu);

        let slack = json!({"text": "hi", "blocks": []});
        assert_eq!(wrap_payload(TargetType::Slack, slack.clone()), slack);
    }

    #[test]
    fn test_marker_fields_are_distinct() {
        let markers: Vec<_> = [TargetType::Dingtalk, TargetType::Feishu, TargetType::Slack]
            .into_iter()
            .filter_map(marker_field)
            .collect();
        assert_eq!(markers.len(), 3);
        assert_ne!(markers[0], markers[1]);
        assert_ne!(markers[1], markers[2]);
        assert_ne!(markers[0], markers[2]);
    }
}
