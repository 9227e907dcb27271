use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse-grained progress of a reconciled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Error,
    Reconciling,
    Healthy,
    Ready,
    /// Terminal: set once teardown starts and never overwritten.
    Removing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Error => "ERROR",
            Phase::Reconciling => "RECONCILING",
            Phase::Healthy => "HEALTHY",
            Phase::Ready => "READY",
            Phase::Removing => "REMOVING",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Status {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Phase>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub progress: String,
}

impl Status {
    pub fn is_removing(&self) -> bool { self.status == Some(Phase::Removing) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_uses_upper_case_wire_names() {
        let s = Status { status: Some(Phase::Removing), message: "bye".into(), progress: String::new() };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v, serde_json::json!({ "status": "REMOVING", "message": "bye" }));
        assert!(s.is_removing());
        assert_eq!(Phase::Healthy.as_str(), "HEALTHY");
    }
}
