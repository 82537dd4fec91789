use super::LogLevel;

pub(crate) fn default_legado_url() -> String {
    "http://127.0.0.1:1122".to_string()
}

pub(crate) fn default_match_prefix() -> String {
    "//read".to_string()
}

pub(crate) fn default_viewport_width() -> u32 {
    600
}

pub(crate) fn default_padding_left() -> u32 {
    10
}

pub(crate) fn default_narrow_char_width() -> u32 {
    8
}

pub(crate) fn default_wide_char_width() -> u32 {
    16
}

pub(crate) fn default_save_debounce_ms() -> u64 {
    2000
}

pub(crate) fn default_connect_timeout_secs() -> u64 {
    5
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    15
}

pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Info
}
