//! Authentication plugins offered during the handshake.
pub mod legacy;
pub mod srp;

/// Plugins this driver can complete, strongest first. The same order goes
/// into the connect identification block.
pub const PLUGIN_LIST: &str = "Srp256,Srp,Legacy_Auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    Srp256,
    Srp,
    Legacy,
}

impl AuthPlugin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Srp256 => "Srp256",
            Self::Srp => "Srp",
            Self::Legacy => "Legacy_Auth",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Srp256" => Self::Srp256,
            "Srp" => Self::Srp,
            "Legacy_Auth" => Self::Legacy,
            _ => return None,
        })
    }
}

/// Failure while running an authentication exchange, before the server gets
/// a say.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed server auth data")]
    MalformedData,
    #[error("server requested unsupported auth plugin {0:?}")]
    UnsupportedPlugin(String),
    #[error("server rejected every offered auth plugin")]
    Exhausted,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_round_trip() {
        for plugin in [AuthPlugin::Srp256, AuthPlugin::Srp, AuthPlugin::Legacy] {
            assert_eq!(AuthPlugin::from_name(plugin.as_str()), Some(plugin));
        }
        assert_eq!(AuthPlugin::from_name("Win_Sspi"), None);
    }

    #[test]
    fn list_matches_supported_plugins() {
        for name in PLUGIN_LIST.split(',') {
            assert!(AuthPlugin::from_name(name).is_some());
        }
    }
}
