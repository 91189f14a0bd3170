use std::fmt;

use logicall_core::domain::preset::PresetType;

pub const PARTITION_KEY: &str = "pk";
pub const SORT_KEY: &str = "sk";

/// Partition/sort key pair addressing one record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub pk: String,
    pub sk: String,
}

impl RecordKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }

    pub fn profile_default(tenant_id: &str) -> Self {
        Self::new(tenant_partition(tenant_id), "PROFILE_DEFAULT")
    }

    pub fn profile_latest(tenant_id: &str, profile_id: &str) -> Self {
        Self::new(tenant_partition(tenant_id), format!("PROFILE_LATEST#{profile_id}"))
    }

    pub fn profile(tenant_id: &str, profile_id: &str, version: &str) -> Self {
        Self::new(tenant_partition(tenant_id), format!("PROFILE#{profile_id}#V#{version}"))
    }

    pub fn preset(preset_type: PresetType, preset_id: &str, version: &str) -> Self {
        Self::new(format!("PRESET#{}", preset_type.as_str()), versioned_id(preset_id, version))
    }

    pub fn http_tool(tool_id: &str, version: &str) -> Self {
        Self::new("HTTPTOOL", versioned_id(tool_id, version))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

fn tenant_partition(tenant_id: &str) -> String {
    format!("TENANT#{tenant_id}")
}

fn versioned_id(id: &str, version: &str) -> String {
    format!("ID#{id}#V#{version}")
}

#[cfg(test)]
mod tests {
    use logicall_core::domain::preset::PresetType;

    use super::RecordKey;

    #[test]
    fn keys_follow_the_table_layout() {
        assert_eq!(
            RecordKey::profile_default("acme"),
            RecordKey::new("TENANT#acme", "PROFILE_DEFAULT")
        );
        assert_eq!(
            RecordKey::profile_latest("acme", "support"),
            RecordKey::new("TENANT#acme", "PROFILE_LATEST#support")
        );
        assert_eq!(
            RecordKey::profile("acme", "support", "3"),
            RecordKey::new("TENANT#acme", "PROFILE#support#V#3")
        );
        assert_eq!(
            RecordKey::preset(PresetType::Llm, "gpt-4.1-mini", "1"),
            RecordKey::new("PRESET#LLM", "ID#gpt-4.1-mini#V#1")
        );
        assert_eq!(
            RecordKey::http_tool("weather_current", "1").to_string(),
            "HTTPTOOL/ID#weather_current#V#1"
        );
    }
}
