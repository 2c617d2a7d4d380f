// File: loyalty-common/src/models/status.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub enabled: bool,
    pub working: bool,
    #[serde(default)]
    pub status_string: String,
}
