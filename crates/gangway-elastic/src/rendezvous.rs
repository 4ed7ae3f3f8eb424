//! Rendezvous configuration and the launcher environment built from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gangway_types::{ElasticPolicy, RdzvBackend, RdzvConf};

/// Rendezvous parameters for the training launcher.
///
/// Only the fields set on the policy are carried; defaulting the rest is
/// left to the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RendezvousConfig {
    pub backend: Option<RdzvBackend>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub id: Option<String>,
    pub conf: Vec<RdzvConf>,
}

impl RendezvousConfig {
    /// Copy the rendezvous fields of a validated policy.
    pub fn from_policy(policy: &ElasticPolicy) -> Self {
        Self {
            backend: policy.rdzv_backend,
            host: policy.rdzv_host.clone(),
            port: policy.rdzv_port.and_then(|p| u16::try_from(p).ok()),
            id: policy.rdzv_id.clone(),
            conf: policy.rdzv_conf.clone(),
        }
    }

    /// Whether the policy set any rendezvous field.
    pub fn is_configured(policy: &ElasticPolicy) -> bool {
        policy.rdzv_backend.is_some()
            || policy.rdzv_host.is_some()
            || policy.rdzv_port.is_some()
            || policy.rdzv_id.is_some()
            || !policy.rdzv_conf.is_empty()
    }

    /// `host:port`, or just `host` when no port is set.
    pub fn endpoint(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        Some(match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        })
    }

    /// Write the `PET_RDZV_*` variables for the set fields.
    pub fn write_env(&self, env: &mut BTreeMap<String, String>) {
        if let Some(backend) = self.backend {
            env.insert("PET_RDZV_BACKEND".to_string(), backend.as_str().to_string());
        }
        if let Some(endpoint) = self.endpoint() {
            env.insert("PET_RDZV_ENDPOINT".to_string(), endpoint);
        }
        if let Some(id) = &self.id {
            env.insert("PET_RDZV_ID".to_string(), id.clone());
        }
        if !self.conf.is_empty() {
            let joined = self
                .conf
                .iter()
                .map(|c| format!("{}={}", c.key, c.value))
                .collect::<Vec<_>>()
                .join(",");
            env.insert("PET_RDZV_CONF".to_string(), joined);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_are_omitted() {
        let config = RendezvousConfig::from_policy(&ElasticPolicy::default());
        assert_eq!(config, RendezvousConfig::default());

        let mut env = BTreeMap::new();
        config.write_env(&mut env);
        assert!(env.is_empty());
    }

    #[test]
    fn full_config_renders_all_variables() {
        let policy = ElasticPolicy {
            rdzv_backend: Some(RdzvBackend::EtcdV2),
            rdzv_host: Some("etcd.ml.svc".to_string()),
            rdzv_port: Some(2379),
            rdzv_id: Some("resnet-7".to_string()),
            rdzv_conf: vec![
                RdzvConf {
                    key: "timeout".to_string(),
                    value: "900".to_string(),
                },
                RdzvConf {
                    key: "protocol".to_string(),
                    value: "https".to_string(),
                },
            ],
            ..Default::default()
        };
        let mut env = BTreeMap::new();
        RendezvousConfig::from_policy(&policy).write_env(&mut env);

        assert_eq!(env["PET_RDZV_BACKEND"], "etcd-v2");
        assert_eq!(env["PET_RDZV_ENDPOINT"], "etcd.ml.svc:2379");
        assert_eq!(env["PET_RDZV_ID"], "resnet-7");
        assert_eq!(env["PET_RDZV_CONF"], "timeout=900,protocol=https");
    }

    #[test]
    fn endpoint_without_port_is_host_only() {
        let config = RendezvousConfig {
            host: Some("coordinator-0".to_string()),
            ..Default::default()
        };
        assert_eq!(config.endpoint().as_deref(), Some("coordinator-0"));

        let port_only = RendezvousConfig {
            port: Some(29400),
            ..Default::default()
        };
        assert_eq!(port_only.endpoint(), None);
    }
}
