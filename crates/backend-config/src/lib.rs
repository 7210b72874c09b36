//! Connection configuration for the managed backend, read from the
//! environment and validated before any client is built.

mod connection;
mod error;
mod loader;

pub use connection::{
    is_local_host, is_managed_host, ConfigWarning, ConnectionConfig, MANAGED_DOMAIN,
    MIN_PUBLIC_KEY_LEN,
};
pub use error::ConfigError;
pub use loader::{
    debug_flag_enabled, load_config, load_config_from, DEBUG_VAR, ENDPOINT_VAR, PUBLIC_KEY_VAR, REQUEST_TIMEOUT_VAR,
};

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const TEST_URL: &str = "https://abcdefghijklmnop.supabase.co";
    const TEST_KEY: &str =
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJyb2xlIjoiYW5vbiIsImlhdCI6MTcwMDAwMDAwMH0.sig";

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Log sink shared with a test subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber capturing everything logged on this thread.
    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, logs)
    }

    #[test]
    fn test_missing_endpoint() {
        let result = load_config_from(vars(&[(PUBLIC_KEY_VAR, TEST_KEY)]));
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_missing_public_key() {
        let result = load_config_from(vars(&[(ENDPOINT_VAR, TEST_URL)]));
        assert!(matches!(result, Err(ConfigError::MissingPublicKey)));
    }

    #[test]
    fn test_missing_both_reports_endpoint_first() {
        let result = load_config_from(Vec::<(String, String)>::new());
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let result = load_config_from(vars(&[(ENDPOINT_VAR, ""), (PUBLIC_KEY_VAR, TEST_KEY)]));
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));

        let result = load_config_from(vars(&[(ENDPOINT_VAR, TEST_URL), (PUBLIC_KEY_VAR, "")]));
        assert!(matches!(result, Err(ConfigError::MissingPublicKey)));
    }

    #[test]
    fn test_invalid_endpoint_mentions_value() {
        let result = load_config_from(vars(&[
            (ENDPOINT_VAR, "not a url"),
            (PUBLIC_KEY_VAR, TEST_KEY),
        ]));

        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { ref value, .. } if value == "not a url"));
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_valid_config_is_verbatim() {
        let config = load_config_from(vars(&[
            (ENDPOINT_VAR, TEST_URL),
            (PUBLIC_KEY_VAR, TEST_KEY),
        ]))
        .unwrap();

        assert_eq!(config.endpoint(), TEST_URL);
        assert_eq!(config.public_key().expose_secret(), TEST_KEY);
        assert!(!config.debug_enabled());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.url().host_str(), Some("abcdefghijklmnop.supabase.co"));
    }

    #[test]
    fn test_debug_flag_must_be_exactly_true() {
        for (value, expected) in [
            ("true", true),
            ("TRUE", false),
            ("1", false),
            ("yes", false),
            ("", false),
        ] {
            let config = load_config_from(vars(&[
                (ENDPOINT_VAR, TEST_URL),
                (PUBLIC_KEY_VAR, TEST_KEY),
                (DEBUG_VAR, value),
            ]))
            .unwrap();
            assert_eq!(config.debug_enabled(), expected, "DEBUG_FLAG={:?}", value);
        }
    }

    #[test]
    fn test_request_timeout_override() {
        let config = load_config_from(vars(&[
            (ENDPOINT_VAR, TEST_URL),
            (PUBLIC_KEY_VAR, TEST_KEY),
            (REQUEST_TIMEOUT_VAR, "30s"),
        ]))
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_short_key_is_a_warning_not_an_error() {
        let config = load_config_from(vars(&[
            (ENDPOINT_VAR, TEST_URL),
            (PUBLIC_KEY_VAR, "0123456789"),
        ]))
        .unwrap();

        assert_eq!(
            config.warnings(),
            vec![ConfigWarning::ShortPublicKey { len: 10 }]
        );
    }

    #[test]
    fn test_short_key_is_logged() {
        let (result, logs) = capture_logs(|| {
            load_config_from(vars(&[
                (ENDPOINT_VAR, TEST_URL),
                (PUBLIC_KEY_VAR, "0123456789"),
            ]))
        });

        assert!(result.is_ok());
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(logs.contains("PUBLIC_API_KEY appears to be too short"), "{}", logs);
    }

    #[test]
    fn test_valid_config_logs_no_warning_or_summary() {
        let (result, logs) = capture_logs(|| {
            load_config_from(vars(&[(ENDPOINT_VAR, TEST_URL), (PUBLIC_KEY_VAR, TEST_KEY)]))
        });

        assert!(result.is_ok());
        assert!(!logs.contains("WARN"), "{}", logs);
        assert!(!logs.contains("Backend configuration loaded"), "{}", logs);
    }

    #[test]
    fn test_debug_summary_is_redacted() {
        let (result, logs) = capture_logs(|| {
            load_config_from(vars(&[
                (ENDPOINT_VAR, TEST_URL),
                (PUBLIC_KEY_VAR, TEST_KEY),
                (DEBUG_VAR, "true"),
            ]))
        });

        assert!(result.unwrap().debug_enabled());
        assert!(logs.contains("Backend configuration loaded successfully"), "{}", logs);
        assert!(logs.contains("https://*****.co"), "{}", logs);
        assert!(
            logs.contains(&format!("public_key_len={}", TEST_KEY.len())),
            "{}",
            logs
        );
        assert!(!logs.contains(TEST_KEY));
        assert!(!logs.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_debug_flag_helper() {
        assert!(debug_flag_enabled(Some("true")));
        assert!(!debug_flag_enabled(Some("True")));
        assert!(!debug_flag_enabled(None));
    }

    #[test]
    fn test_unexpected_host_warning() {
        let config = load_config_from(vars(&[
            (ENDPOINT_VAR, "https://api.example.com"),
            (PUBLIC_KEY_VAR, TEST_KEY),
        ]))
        .unwrap();

        assert_eq!(
            config.warnings(),
            vec![ConfigWarning::UnexpectedHost {
                host: "api.example.com".into()
            }]
        );
    }

    #[test]
    fn test_local_hosts_do_not_warn() {
        for url in [
            "http://localhost:54321",
            "http://127.0.0.1:54321",
            "http://[::1]:54321",
        ] {
            let config = load_config_from(vars(&[(ENDPOINT_VAR, url), (PUBLIC_KEY_VAR, TEST_KEY)]))
                .unwrap();
            assert!(config.warnings().is_empty(), "{} produced warnings", url);
        }
    }

    #[test]
    fn test_managed_host_matching() {
        assert!(is_managed_host("supabase.co"));
        assert!(is_managed_host("abc.supabase.co"));
        assert!(!is_managed_host("notsupabase.co"));
        assert!(!is_managed_host("supabase.co.evil.com"));
    }

    #[test]
    fn test_redacted_endpoint() {
        let config = ConnectionConfig::new(Some(TEST_URL.into()), Some(TEST_KEY.into()), true).unwrap();
        assert_eq!(config.redacted_endpoint(), "https://*****.co");

        let local =
            ConnectionConfig::new(Some("http://localhost:54321".into()), Some(TEST_KEY.into()), true)
                .unwrap();
        assert_eq!(local.redacted_endpoint(), "http://localhost:54321");
    }

    #[test]
    fn test_debug_output_hides_key() {
        let config = ConnectionConfig::new(Some(TEST_URL.into()), Some(TEST_KEY.into()), false).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(TEST_KEY));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::MissingEndpoint.to_string(),
            "Config error: ENDPOINT_URL is required. Please check your .env file."
        );
        assert_eq!(
            ConfigError::MissingPublicKey.to_string(),
            "Config error: PUBLIC_API_KEY is required. Please check your .env file."
        );
    }
}
