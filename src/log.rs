/// Sandbox console method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Log,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [LogLevel::Log, LogLevel::Info, LogLevel::Warn, LogLevel::Error];

    /// Name of the `console` method bound to this level
    pub fn method(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Log => "log",
        }
    }

    /// Prefix prepended to every output line at this level
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR] ",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Log => "",
        }
    }

    pub fn format_line(&self, message: &str) -> String {
        format!("{}{}", self.prefix(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(LogLevel::Log.format_line("hi"), "hi");
        assert_eq!(LogLevel::Error.format_line("boom"), "[ERROR] boom");
        assert_eq!(LogLevel::Warn.format_line("careful"), "[WARN] careful");
        assert_eq!(LogLevel::Info.format_line("fyi"), "[INFO] fyi");
    }

    #[test]
    fn test_methods() {
        let methods: Vec<_> = LogLevel::ALL.iter().map(LogLevel::method).collect();
        assert_eq!(methods, ["log", "info", "warn", "error"]);
    }
}
