use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::base::{BASE_APP_ID, BASE_AVPS, BASE_COMMANDS};
use crate::data_type::{AppKind, AvpDataType};

/// Dictionary lookup errors.
#[derive(Error, Debug)]
pub enum DictError {
    #[error("unknown AVP code {code} (vendor {vendor}) in application {app}")]
    UnknownAvp { app: u32, code: u32, vendor: u32 },

    #[error("unknown command code {code} in application {app}")]
    UnknownCommand { app: u32, code: u32 },
}

/// Declared AVP: code, vendor and data type.
#[derive(Debug, Clone)]
pub struct AvpDef {
    pub code: u32,
    pub vendor_id: u32,
    pub name: String,
    pub data_type: AvpDataType,
}

/// Declared command. The mux keys handlers by `short` plus an `R`/`A`
/// suffix ("CER", "CEA", ...).
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub code: u32,
    pub name: String,
    pub short: String,
}

impl CommandDef {
    /// Handler-table key for the request or answer form of this command.
    pub fn key(&self, request: bool) -> String {
        format!("{}{}", self.short, if request { "R" } else { "A" })
    }
}

/// Declared application with its kind.
#[derive(Debug, Clone)]
pub struct ApplicationDef {
    pub id: u32,
    pub kind: AppKind,
    pub name: String,
}

/// Static declaration of known commands, AVPs and applications.
///
/// Lookups are keyed by application id and fall back to the base protocol
/// (application 0). The dictionary is populated at startup and read-many
/// afterwards; extend it before any `listen`/`dial`.
pub struct Dictionary {
    avps: DashMap<(u32, u32, u32), Arc<AvpDef>>,
    commands: DashMap<(u32, u32), Arc<CommandDef>>,
    apps: DashMap<u32, Arc<ApplicationDef>>,
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self {
            avps: DashMap::new(),
            commands: DashMap::new(),
            apps: DashMap::new(),
        }
    }

    /// Create a dictionary preloaded with the RFC 6733 base protocol.
    pub fn base() -> Self {
        let dict = Self::new();
        for &(code, name, data_type) in BASE_AVPS {
            dict.register_avp(
                BASE_APP_ID,
                AvpDef {
                    code,
                    vendor_id: 0,
                    name: name.to_string(),
                    data_type,
                },
            );
        }
        for &(code, name, short) in BASE_COMMANDS {
            dict.register_command(
                BASE_APP_ID,
                CommandDef {
                    code,
                    name: name.to_string(),
                    short: short.to_string(),
                },
            );
        }
        dict
    }

    /// Register an AVP under the given application id.
    pub fn register_avp(&self, app: u32, def: AvpDef) {
        self.avps
            .insert((app, def.code, def.vendor_id), Arc::new(def));
    }

    /// Register a command under the given application id.
    pub fn register_command(&self, app: u32, def: CommandDef) {
        self.commands.insert((app, def.code), Arc::new(def));
    }

    /// Register an application.
    pub fn register_application(&self, def: ApplicationDef) {
        self.apps.insert(def.id, Arc::new(def));
    }

    /// Resolve `(application, code, vendor)` to its declared AVP.
    ///
    /// Falls back to the base protocol when the triple is not found under
    /// the requested application.
    pub fn find_avp(&self, app: u32, code: u32, vendor: u32) -> Result<Arc<AvpDef>, DictError> {
        if let Some(def) = self.avps.get(&(app, code, vendor)) {
            return Ok(def.value().clone());
        }
        if app != BASE_APP_ID {
            if let Some(def) = self.avps.get(&(BASE_APP_ID, code, vendor)) {
                return Ok(def.value().clone());
            }
        }
        Err(DictError::UnknownAvp { app, code, vendor })
    }

    /// Resolve `(application, code)` to its declared command.
    pub fn find_command(&self, app: u32, code: u32) -> Result<Arc<CommandDef>, DictError> {
        if let Some(def) = self.commands.get(&(app, code)) {
            return Ok(def.value().clone());
        }
        if app != BASE_APP_ID {
            if let Some(def) = self.commands.get(&(BASE_APP_ID, code)) {
                return Ok(def.value().clone());
            }
        }
        Err(DictError::UnknownCommand { app, code })
    }

    /// Look up a declared application.
    pub fn app(&self, id: u32) -> Option<Arc<ApplicationDef>> {
        self.apps.get(&id).map(|e| e.value().clone())
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::base()
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT: Arc<Dictionary> = Arc::new(Dictionary::base());
}

/// Process-wide default dictionary, preloaded with the base protocol.
///
/// Applications registered here are visible to every endpoint that did not
/// get an explicit dictionary. Register before the first network operation.
pub fn default() -> Arc<Dictionary> {
    DEFAULT.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{avp_code, cmd_code};

    #[test]
    fn test_find_base_avp() {
        let dict = Dictionary::base();
        let def = dict.find_avp(0, avp_code::ORIGIN_HOST, 0).unwrap();
        assert_eq!(def.name, "Origin-Host");
        assert_eq!(def.data_type, AvpDataType::DiameterIdentity);
    }

    #[test]
    fn test_find_avp_falls_back_to_base() {
        let dict = Dictionary::base();
        let def = dict.find_avp(4, avp_code::RESULT_CODE, 0).unwrap();
        assert_eq!(def.data_type, AvpDataType::Unsigned32);
    }

    #[test]
    fn test_find_unknown_avp() {
        let dict = Dictionary::base();
        let err = dict.find_avp(0, 99999, 0).unwrap_err();
        assert!(matches!(err, DictError::UnknownAvp { code: 99999, .. }));
    }

    #[test]
    fn test_find_command() {
        let dict = Dictionary::base();
        let def = dict.find_command(0, cmd_code::CAPABILITIES_EXCHANGE).unwrap();
        assert_eq!(def.short, "CE");
        assert_eq!(def.key(true), "CER");
        assert_eq!(def.key(false), "CEA");
    }

    #[test]
    fn test_vendor_avp_registration() {
        let dict = Dictionary::base();
        dict.register_avp(
            16777238,
            AvpDef {
                code: 1001,
                vendor_id: 10415,
                name: "Charging-Rule-Install".to_string(),
                data_type: AvpDataType::Grouped,
            },
        );
        let def = dict.find_avp(16777238, 1001, 10415).unwrap();
        assert_eq!(def.name, "Charging-Rule-Install");
        assert!(dict.find_avp(0, 1001, 10415).is_err());
    }

    #[test]
    fn test_application_registry() {
        let dict = Dictionary::base();
        dict.register_application(ApplicationDef {
            id: 1001,
            kind: AppKind::Acct,
            name: "Test-Acct".to_string(),
        });
        let app = dict.app(1001).unwrap();
        assert_eq!(app.kind, AppKind::Acct);
        assert!(dict.app(1002).is_none());
    }
}
