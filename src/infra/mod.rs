pub(crate) mod app_paths;
pub(crate) mod control_client;
pub(crate) mod db;
pub(crate) mod kv_store;
pub(crate) mod settings;
