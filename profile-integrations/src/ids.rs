pub const APP_ID: &str = "app.retreats.profiled";

pub const REMOTE_COLLECTION_PROFILES: &str = "profiles";

pub const KEY_PROFILE: &str = "profile";
pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_SESSION_IDENTITY: &str = "session_identity";

pub const ENV_DATA_DIR: &str = "PROFILED_DATA_DIR";
pub const ENV_REMOTE_URL: &str = "PROFILED_REMOTE_URL";
pub const ENV_API_TOKEN: &str = "PROFILED_API_TOKEN";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "PROFILED_REMOTE_TIMEOUT_MS";
pub const ENV_RETRY_BASE_MS: &str = "PROFILED_RETRY_BASE_MS";
pub const ENV_RETRY_JITTER: &str = "PROFILED_RETRY_JITTER";
pub const ENV_STORAGE_QUOTA_BYTES: &str = "PROFILED_STORAGE_QUOTA_BYTES";
pub const ENV_LOG: &str = "PROFILED_LOG";
