use herbarium::RunOptions;
use log::{error, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Cli {
    env_file: Option<PathBuf>,
    options: RunOptions,
}

fn take_value<I>(flag: &str, inline: Option<&str>, args: &mut I) -> Result<String, String>
where
    I: Iterator<Item = OsString>,
{
    let value = match inline {
        Some(v) => v.to_string(),
        None => args
            .next()
            .ok_or_else(|| format!("`{}` requires an argument", flag))?
            .into_string()
            .map_err(|_| format!("`{}` argument contains invalid UTF-8", flag))?,
    };
    if value.is_empty() {
        return Err(format!("`{}` requires an argument", flag));
    }
    Ok(value)
}

fn set_once<T>(slot: &mut Option<T>, flag: &str, value: T) -> Result<(), String> {
    if slot.is_some() {
        return Err(format!("`{}` provided more than once", flag));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_cli<I>(args: I) -> Result<Cli, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut cli = Cli::default();

    while let Some(arg) = args.next() {
        let Some(arg) = arg.to_str() else {
            return Err("argument contains invalid UTF-8".to_string());
        };
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (arg, None),
        };
        match flag {
            "--env-file" => {
                let value = take_value(flag, inline, &mut args)?;
                set_once(&mut cli.env_file, flag, PathBuf::from(value))?;
            }
            "--ingest" => {
                let value = take_value(flag, inline, &mut args)?;
                set_once(&mut cli.options.ingest_file, flag, PathBuf::from(value))?;
            }
            "--report" => {
                let value = take_value(flag, inline, &mut args)?;
                set_once(&mut cli.options.report_user, flag, value)?;
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }
    Ok(cli)
}

fn configure_env(env_file: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        Ok(Some(LoadedEnvFile { path, explicit: true }))
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            load_env_file(&default_path)?;
            Ok(Some(LoadedEnvFile {
                path: default_path,
                explicit: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in contents.lines().enumerate() {
        let assignment = parse_env_assignment(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) = assignment else { continue };
        // The process environment wins over the file.
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from main before logging or any other thread starts.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// `KEY=value`, optionally prefixed by `export`; blank lines and `#` comments yield `None`.
fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw_value) = line
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw_value = raw_value.trim();
    let value = match raw_value.chars().next() {
        Some(quote @ ('"' | '\'')) => parse_quoted(&raw_value[1..], quote)?,
        _ => raw_value.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

/// Body of a quoted value after the opening quote. Escapes only apply inside double quotes.
fn parse_quoted(input: &str, quote: char) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == quote {
            let rest = chars.as_str().trim();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(result);
            }
            return Err(format!("unexpected characters after closing {} quote", quote));
        }
        if ch == '\\' && quote == '"' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
            result.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            continue;
        }
        result.push(ch);
    }

    Err(format!("unterminated {}-quoted value", if quote == '"' { "double" } else { "single" }))
}

fn main() {
    let (loaded_env, options) = match parse_cli(std::env::args_os().skip(1))
        .and_then(|cli| configure_env(cli.env_file).map(|loaded| (loaded, cli.options)))
    {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "herbarium {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = herbarium::run(&options) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_accepts_separate_and_inline_values() {
        let cli = parse_cli(args(&["--env-file", "prod.env", "--ingest=uploads.jsonl", "--report", "uid-7"])).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(cli.options.ingest_file, Some(PathBuf::from("uploads.jsonl")));
        assert_eq!(cli.options.report_user.as_deref(), Some("uid-7"));
    }

    #[test]
    fn cli_rejects_bad_usage() {
        assert!(parse_cli(args(&["--report"])).is_err());
        assert!(parse_cli(args(&["--ingest="])).is_err());
        assert!(parse_cli(args(&["--report", "a", "--report", "b"])).is_err());
        assert!(parse_cli(args(&["--verbose"])).is_err());
        assert_eq!(parse_cli(args(&["--", "ignored"])).unwrap(), Cli::default());
    }

    #[test]
    fn env_assignments_handle_quotes_and_comments() {
        assert_eq!(parse_env_assignment("# comment").unwrap(), None);
        assert_eq!(parse_env_assignment("   ").unwrap(), None);
        assert_eq!(
            parse_env_assignment("export DATABASE_URL=postgres://x # local").unwrap(),
            Some(("DATABASE_URL".to_string(), "postgres://x".to_string()))
        );
        assert_eq!(
            parse_env_assignment(r#"DEMO_USER_ID="a b\tc""#).unwrap(),
            Some(("DEMO_USER_ID".to_string(), "a b\tc".to_string()))
        );
        assert_eq!(
            parse_env_assignment("RUST_LOG='debug # not a comment'").unwrap(),
            Some(("RUST_LOG".to_string(), "debug # not a comment".to_string()))
        );
    }

    #[test]
    fn env_assignments_reject_malformed_lines() {
        assert!(parse_env_assignment("NO_EQUALS").is_err());
        assert!(parse_env_assignment("=value").is_err());
        assert!(parse_env_assignment("BAD KEY=1").is_err());
        assert!(parse_env_assignment("OPEN=\"unterminated").is_err());
        assert!(parse_env_assignment("TRAIL='x' y").is_err());
    }
}
