//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O (diagnostic reports, CLI reports, project manifests).

pub const MFORM_DIAG_SCHEMA_VERSION: &str = "mform.diag@0.1.0";
pub const MFORMC_REPORT_SCHEMA_VERSION: &str = "mformc.report@0.1.0";

pub const PROJECT_MANIFEST_SCHEMA_VERSION: &str = "mform.project@0.1.0";
pub const PROJECT_MANIFEST_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[PROJECT_MANIFEST_SCHEMA_VERSION];

pub const PROJECT_MANIFEST_FILE_NAME: &str = "mform.json";
