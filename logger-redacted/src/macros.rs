// Logging macros that pass the formatted message through the redactor
#[macro_export]
macro_rules! redacted_info {
    ($($arg:tt)*) => {
        $crate::tracing::info!("{}", $crate::redact(&format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! redacted_warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!("{}", $crate::redact(&format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! redacted_error {
    ($($arg:tt)*) => {
        $crate::tracing::error!("{}", $crate::redact(&format!($($arg)*)))
    };
}
