//! Environment diagnostics for `ocrelay check`.
//!
//! Verifies the configuration, the selected OCR backend and the bot
//! credentials without processing any post.

use crate::config::{Config, SinkKind};
use crate::ocr::{EngineKind, RemoteOcrEngine, TesseractEngine};
use crate::source::CredentialProvider;
use crate::telegram::BotApi;
use owo_colors::OwoColorize;
use std::time::Duration;

/// Result of one check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Passed, with a short detail line
    Ok(String),
    /// Usable, but something needs attention
    Warning(String),
    /// The relay cannot run like this
    Failed(String),
}

impl CheckResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, CheckResult::Failed(_))
    }
}

/// A named check and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: &'static str,
    pub result: CheckResult,
}

fn check_config(config: &Config) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult::Ok("valid".to_string()),
        Err(e) => CheckResult::Failed(e.to_string()),
    }
}

fn check_channel(config: &Config) -> CheckResult {
    if config.source.channel.trim().is_empty() {
        CheckResult::Failed(
            "source.channel is not set (config file or OCRELAY_CHANNEL)".to_string(),
        )
    } else {
        CheckResult::Ok(config.source.channel.clone())
    }
}

fn check_sink(config: &Config) -> CheckResult {
    match config.sink.kind {
        SinkKind::Stdout => CheckResult::Ok("stdout".to_string()),
        SinkKind::Telegram if config.sink.chat_id.trim().is_empty() => CheckResult::Failed(
            "sink.chat_id is not set (config file or OCRELAY_SINK_CHAT)".to_string(),
        ),
        SinkKind::Telegram => CheckResult::Ok(format!("telegram chat {}", config.sink.chat_id)),
    }
}

/// Local engine: compiled in, and traineddata present when a directory is configured.
fn check_local_engine(config: &Config) -> CheckResult {
    if !TesseractEngine::is_available() {
        return CheckResult::Failed(
            "built without Tesseract → rebuild with: cargo build --release --features tesseract"
                .to_string(),
        );
    }
    let Some(ref dir) = config.ocr.tessdata_dir else {
        return CheckResult::Ok(format!(
            "tesseract ({}, system tessdata)",
            config.ocr.languages.join("+")
        ));
    };
    let missing: Vec<&str> = config
        .ocr
        .languages
        .iter()
        .filter(|lang| !dir.join(format!("{lang}.traineddata")).is_file())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        CheckResult::Ok(format!("tesseract ({})", config.ocr.languages.join("+")))
    } else {
        CheckResult::Failed(format!(
            "missing traineddata in {}: {}",
            dir.display(),
            missing.join(", ")
        ))
    }
}

async fn check_remote_engine(config: &Config) -> CheckResult {
    let engine = match RemoteOcrEngine::new(config.remote_config()) {
        Ok(engine) => engine,
        Err(e) => return CheckResult::Failed(e.to_string()),
    };
    match engine.check().await {
        Ok(()) => CheckResult::Ok(format!("{} is healthy", config.ocr.endpoint)),
        Err(e) => CheckResult::Failed(e.to_string()),
    }
}

async fn check_bot(config: &Config, credentials: &dyn CredentialProvider) -> CheckResult {
    let token = match credentials.bot_token() {
        Ok(token) => token,
        Err(e) => return CheckResult::Failed(e.to_string()),
    };
    let api = match BotApi::new(&config.source.api_base, token, Duration::from_secs(10)) {
        Ok(api) => api,
        Err(e) => return CheckResult::Failed(e.to_string()),
    };
    match api.get_me().await {
        Ok(me) => CheckResult::Ok(format!(
            "authorized as @{}",
            me.username.unwrap_or(me.first_name)
        )),
        Err(e) => CheckResult::Failed(e.to_string()),
    }
}

/// Run every check. Backend and bot checks need the network.
pub async fn run_checks(config: &Config, credentials: &dyn CredentialProvider) -> Vec<Check> {
    let ocr = match config.ocr.backend {
        EngineKind::Local => check_local_engine(config),
        EngineKind::Remote => check_remote_engine(config).await,
    };
    let archive = match config.archive.dir {
        Some(ref dir) if dir.is_dir() => CheckResult::Ok(dir.display().to_string()),
        Some(ref dir) => CheckResult::Warning(format!("{} does not exist yet", dir.display())),
        None => CheckResult::Ok("disabled".to_string()),
    };

    vec![
        Check {
            name: "Configuration",
            result: check_config(config),
        },
        Check {
            name: "Channel",
            result: check_channel(config),
        },
        Check {
            name: "Sink",
            result: check_sink(config),
        },
        Check {
            name: "OCR backend",
            result: ocr,
        },
        Check {
            name: "Bot credentials",
            result: check_bot(config, credentials).await,
        },
        Check {
            name: "Archive",
            result: archive,
        },
    ]
}

/// Print check results. Returns `true` when nothing failed.
pub fn print_checks(checks: &[Check]) -> bool {
    println!("ocrelay {}", crate::version_string());
    println!();
    for check in checks {
        print!("  {:<16} ", format!("{}:", check.name));
        match check.result {
            CheckResult::Ok(ref detail) => println!("{} {}", "✓".green(), detail),
            CheckResult::Warning(ref msg) => println!("{} {}", "⚠".yellow(), msg),
            CheckResult::Failed(ref msg) => println!("{} {}", "✗".red(), msg),
        }
    }
    println!();

    let ok = !checks.iter().any(|c| c.result.is_failed());
    if ok {
        println!("{}", "✓ Ready to relay.".green());
    } else {
        println!("{}", "✗ Fix the failed checks above before running.".red());
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticCredentials;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_check_result_is_failed() {
        assert!(CheckResult::Failed("x".into()).is_failed());
        assert!(!CheckResult::Warning("x".into()).is_failed());
        assert!(!CheckResult::Ok("x".into()).is_failed());
    }

    #[test]
    fn test_channel_required() {
        let mut config = Config::default();
        assert!(check_channel(&config).is_failed());
        config.source.channel = "@news".into();
        assert_eq!(check_channel(&config), CheckResult::Ok("@news".into()));
    }

    #[test]
    fn test_sink_chat_required_for_telegram_only() {
        let mut config = Config::default();
        assert!(check_sink(&config).is_failed());
        config.sink.kind = SinkKind::Stdout;
        assert!(!check_sink(&config).is_failed());
    }

    #[test]
    fn test_local_engine_reports_missing_traineddata() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("eng.traineddata"), b"x").unwrap();
        let mut config = Config::default();
        config.ocr.tessdata_dir = Some(tmp.path().to_path_buf());

        let result = check_local_engine(&config);
        if TesseractEngine::is_available() {
            assert_eq!(
                result,
                CheckResult::Failed(format!(
                    "missing traineddata in {}: rus",
                    tmp.path().display()
                ))
            );
        } else {
            assert!(result.is_failed());
        }
    }

    #[tokio::test]
    async fn test_run_checks_against_mock_services() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"id": 1, "first_name": "relay", "username": "relay_bot"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.source.channel = "@news".into();
        config.source.api_base = server.uri();
        config.sink.kind = SinkKind::Stdout;
        config.ocr.backend = EngineKind::Remote;
        config.ocr.endpoint = format!("{}/ocr", server.uri());

        let checks = run_checks(&config, &StaticCredentials::new("TOKEN")).await;

        for check in &checks {
            assert!(!check.result.is_failed(), "{}: {:?}", check.name, check.result);
        }
        let bot = checks.iter().find(|c| c.name == "Bot credentials").unwrap();
        assert_eq!(bot.result, CheckResult::Ok("authorized as @relay_bot".into()));
        assert!(print_checks(&checks));
    }

    #[tokio::test]
    async fn test_missing_token_fails_bot_check() {
        let config = Config::default();
        let result = check_bot(&config, &StaticCredentials::new("")).await;
        assert!(result.is_failed());
    }
}
