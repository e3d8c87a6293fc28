use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identity of a subscription row
pub type SubscriptionId = i64;

// ============================================================================
// Scene Models
// ============================================================================

/// Scene is a named, independently cacheable data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub name: String,
    pub description: Option<String>,
    /// Key into the data source registry
    pub handler: String,
    /// Cache TTL in seconds, 0 disables caching
    pub cache_ttl: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Enabled scene with fresh timestamps
    pub fn new(name: impl Into<String>, handler: impl Into<String>, cache_ttl: u64) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            handler: handler.into(),
            cache_ttl,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cache lifetime for this scene's payload, `None` when caching is disabled
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl > 0).then(|| Duration::from_secs(self.cache_ttl))
    }
}

// ============================================================================
// Subscription Models
// ============================================================================

/// TargetType enumerates the supported push channels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Generic HTTP endpoint, raw JSON body
    Webhook,
    /// DingTalk robot webhook
    Dingtalk,
    /// Feishu / Lark bot webhook
    Feishu,
    /// Slack incoming webhook
    Slack,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Webhook => "webhook",
            TargetType::Dingtalk => "dingtalk",
            TargetType::Feishu => "feishu",
            TargetType::Slack => "slack",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" | "http" => Ok(TargetType::Webhook),
            "dingtalk" => Ok(TargetType::Dingtalk),
            "feishu" | "lark" => Ok(TargetType::Feishu),
            "slack" => Ok(TargetType::Slack),
            other => Err(format!("unknown target type: {}", other)),
        }
    }
}

/// TargetAuth carries optional credentials for a push target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetAuth {
    Bearer { token: String },
    Custom { headers: HashMap<String, String> },
}

/// TriggerType defines how a subscription is fired
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// Fired by the schedule manager
    Cron,
    /// Fired on demand only
    Manual,
    /// Never pushes; data is pulled by a third party
    Passive,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Cron => "cron",
            TriggerType::Manual => "manual",
            TriggerType::Passive => "passive",
        }
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cron" => Ok(TriggerType::Cron),
            "manual" => Ok(TriggerType::Manual),
            "passive" => Ok(TriggerType::Passive),
            other => Err(format!("unknown trigger type: {}", other)),
        }
    }
}

/// TriggerConfig holds trigger-specific settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

/// Subscription binds a scene to a push target with a trigger policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub scene_name: String,
    pub name: String,
    pub target_type: TargetType,
    pub target_url: String,
    pub target_auth: Option<TargetAuth>,
    pub trigger_type: TriggerType,
    pub trigger_config: TriggerConfig,
    /// Raw template text with `{{dotted.path}}` placeholders
    pub template: Option<String>,
    pub enabled: bool,
    pub retry_count: u32,
    /// Per-attempt timeout in seconds, 0 means the engine default
    pub timeout_seconds: u64,
    pub created_by: Option<i64>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub next_trigger_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Enabled, manually triggered subscription without auth, template or retries
    pub fn new(
        id: SubscriptionId,
        scene_name: impl Into<String>,
        name: impl Into<String>,
        target_type: TargetType,
        target_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            scene_name: scene_name.into(),
            name: name.into(),
            target_type,
            target_url: target_url.into(),
            target_auth: None,
            trigger_type: TriggerType::Manual,
            trigger_config: TriggerConfig::default(),
            template: None,
            enabled: true,
            retry_count: 0,
            timeout_seconds: 0,
            created_by: None,
            last_triggered_at: None,
            next_trigger_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Switch to a cron trigger with `expression`
    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.trigger_type = TriggerType::Cron;
        self.trigger_config = TriggerConfig {
            cron: Some(expression.into()),
        };
        self
    }

    /// True when the schedule manager should own a job for this subscription
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.trigger_type == TriggerType::Cron
    }

    /// Per-attempt timeout, falling back to `default` when unset
    pub fn timeout_or(&self, default: Duration) -> Duration {
        if self.timeout_seconds == 0 {
            default
        } else {
            Duration::from_secs(self.timeout_seconds)
        }
    }

    pub fn push_target(&self) -> PushTarget {
        PushTarget::from(self)
    }
}

// ============================================================================
// Defensive parsing of JSON text columns
// ============================================================================

/// Parse the `target_auth` column; malformed or empty text yields `None`
pub fn parse_target_auth(raw: Option<&str>) -> Option<TargetAuth> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match serde_json::from_str::<TargetAuth>(raw) {
        Ok(auth) => Some(auth),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed target auth");
            None
        }
    }
}

/// Parse the `trigger_config` column; malformed or empty text yields the default
pub fn parse_trigger_config(raw: Option<&str>) -> TriggerConfig {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return TriggerConfig::default();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring malformed trigger config");
        TriggerConfig::default()
    })
}

/// Normalize the `template` column
///
/// A JSON string literal is unwrapped, JSON `null` and blank text mean no
/// template, anything else (including text that is not valid JSON until
/// its placeholders are substituted) is kept verbatim.
pub fn parse_template(raw: Option<&str>) -> Option<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::String(s)) => Some(s).filter(|s| !s.trim().is_empty()),
        Ok(serde_json::Value::Null) => None,
        _ => Some(raw.to_string()),
    }
}

// ============================================================================
// Delivery Models
// ============================================================================

/// PushTarget describes one delivery destination, derived at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub struct PushTarget {
    pub target_type: TargetType,
    pub url: String,
    pub auth: Option<TargetAuth>,
}

impl From<&Subscription> for PushTarget {
    fn from(subscription: &Subscription) -> Self {
        Self {
            target_type: subscription.target_type,
            url: subscription.target_url.clone(),
            auth: subscription.target_auth.clone(),
        }
    }
}

/// DeliveryResult is the outcome of a push attempt (or of the last attempt of a retry run)
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub ok: bool,
    /// HTTP status code, 0 for transport failures
    pub status: u16,
    pub body: String,
    pub duration: Duration,
}

impl DeliveryResult {
    /// Result for a request that never produced an HTTP response
    pub fn transport_failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            ok: false,
            status: 0,
            body: message.into(),
            duration,
        }
    }
}

/// Aggregate counts of a broadcast
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_type_round_trip_strings() {
        for t in [
            TargetType::Webhook,
            TargetType::Dingtalk,
            TargetType::Feishu,
            TargetType::Slack,
        ] {
            assert_eq!(t.as_str().parse::<TargetType>(), Ok(t));
        }
        assert_eq!("Lark".parse::<TargetType>(), Ok(TargetType::Feishu));
        assert!("pigeon".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_parse_target_auth_bearer() {
        let auth = parse_target_auth(Some(r#"{"type":"bearer","token":"abc"}"#));
        assert_eq!(
            auth,
            Some(TargetAuth::Bearer {
                token: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_parse_target_auth_custom() {
        let auth = parse_target_auth(Some(r#"{"type":"custom","headers":{"X-Key":"1"}}"#));
        match auth {
            Some(TargetAuth::Custom { headers }) => assert_eq!(headers["X-Key"], "1"),
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_columns_fall_back() {
        assert_eq!(parse_target_auth(Some("{not json")), None);
        assert_eq!(parse_target_auth(Some("")), None);
        assert_eq!(parse_target_auth(None), None);
        assert_eq!(parse_trigger_config(Some("[1,2")), TriggerConfig::default());
        assert_eq!(
            parse_trigger_config(Some(r#"{"cron":"*/5 * * * *"}"#)).cron.as_deref(),
            Some("*/5 * * * *")
        );
    }

    #[test]
    fn test_parse_template_variants() {
        assert_eq!(parse_template(None), None);
        assert_eq!(parse_template(Some("null")), None);
        assert_eq!(
            parse_template(Some(r#""{\"x\": {{a}}}""#)).as_deref(),
            Some(r#"{"x": {{a}}}"#)
        );
        assert_eq!(
            parse_template(Some(r#"{"x": {{a}}}"#)).as_deref(),
            Some(r#"{"x": {{a}}}"#)
        );
    }

    #[test]
    fn test_scene_cache_ttl() {
        let mut scene = Scene {
            name: "weibo".into(),
            description: None,
            handler: "weibo".into(),
            cache_ttl: 0,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(scene.cache_ttl(), None);
        scene.cache_ttl = 300;
        assert_eq!(scene.cache_ttl(), Some(Duration::from_secs(300)));
    }
}
