//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser};
use reqwest::header::{HeaderName, HeaderValue};

/// Bulk-fetch JSON resources from a remote API.
///
/// Bulkfetch generates a sequence of URLs from numeric ids or date windows,
/// fetches them concurrently with bounded retries and an optional rate limit,
/// and writes every payload as one JSON array.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
#[command(group(ArgGroup::new("source").required(true).args(["ids", "from"])))]
pub struct Args {
    /// Base URL every generated id or date window is appended to
    #[arg(short = 'b', long)]
    pub base_url: String,

    /// Numeric id range to fetch, END exclusive (e.g. 0..50)
    #[arg(long, value_name = "START..END", value_parser = parse_id_range)]
    pub ids: Option<IdRange>,

    /// Step between ids
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub step: u64,

    /// First day of the date range (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last day of the date range, inclusive (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,

    /// Days per date window
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=3660))]
    pub days: u32,

    /// Path template for date windows, with {from} and {to} placeholders
    #[arg(long, default_value = "{from}/{to}")]
    pub template: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent fetches (1-100) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per item, first try included (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: Option<u8>,

    /// Items released per period (0 disables throttling)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u32).range(0..=10_000))]
    pub rate_limit: Option<u32>,

    /// Throttle period in milliseconds (1-3600000) [default: 1000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3_600_000))]
    pub period_ms: Option<u64>,

    /// Upper bound of the random pause after each successful fetch, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60_000))]
    pub jitter_ms: Option<u64>,

    /// Stop retrying client errors (4xx) after the first attempt
    #[arg(long)]
    pub fail_fast: bool,

    /// Wait with exponential backoff between attempts
    #[arg(long)]
    pub backoff: bool,

    /// Send a token in a request header
    #[arg(long, value_name = "NAME=TOKEN", value_parser = parse_header_credential, conflicts_with = "query_auth")]
    pub header_auth: Option<Credential>,

    /// Send a token as a query parameter
    #[arg(long, value_name = "NAME=TOKEN", value_parser = parse_credential)]
    pub query_auth: Option<Credential>,

    /// Write the payloads to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Read defaults from this TOML file instead of the standard location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exit with a non-zero status if any item failed
    #[arg(long)]
    pub strict: bool,
}

/// Half-open id range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

/// `NAME=TOKEN` pair from the command line.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn parse_id_range(raw: &str) -> Result<IdRange, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{raw}'"))?;
    let start: i64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid range start '{start}': {e}"))?;
    let end: i64 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid range end '{end}': {e}"))?;
    if end < start {
        return Err(format!("range end {end} is before start {start}"));
    }
    Ok(IdRange { start, end })
}

fn parse_credential(raw: &str) -> Result<Credential, String> {
    let (name, token) = raw
        .split_once('=')
        .ok_or_else(|| "expected NAME=TOKEN".to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("credential name must not be empty".to_string());
    }
    Ok(Credential {
        name: name.to_string(),
        token: token.to_string(),
    })
}

fn parse_header_credential(raw: &str) -> Result<Credential, String> {
    let credential = parse_credential(raw)?;
    HeaderName::from_bytes(credential.name.as_bytes())
        .map_err(|_| format!("'{}' is not a valid HTTP header name", credential.name))?;
    HeaderValue::from_str(&credential.token)
        .map_err(|_| "token contains characters not allowed in an HTTP header".to_string())?;
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 3] = ["bulkfetch", "--base-url", "https://api.example.com/items"];

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(BASE.iter().chain(extra).copied())
    }

    #[test]
    fn test_cli_minimal_id_args_parse_successfully() {
        let args = parse(&["--ids", "0..50"]).unwrap();
        assert_eq!(args.base_url, "https://api.example.com/items");
        assert_eq!(args.ids, Some(IdRange { start: 0, end: 50 }));
        assert_eq!(args.step, 1);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.concurrency, None);
        assert_eq!(args.max_attempts, None);
        assert!(!args.strict);
    }

    #[test]
    fn test_cli_source_is_required() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_base_url_is_required() {
        let err = Args::try_parse_from(["bulkfetch", "--ids", "0..3"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_ids_and_dates_conflict() {
        let err = parse(&["--ids", "0..3", "--from", "2025-09-01", "--to", "2025-09-02"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_date_range_parses() {
        let args = parse(&[
            "--from",
            "2025-09-01",
            "--to",
            "2025-09-30",
            "--days",
            "10",
            "--template",
            "report?from={from}&to={to}",
        ])
        .unwrap();
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(args.to, NaiveDate::from_ymd_opt(2025, 9, 30));
        assert_eq!(args.days, 10);
        assert_eq!(args.template, "report?from={from}&to={to}");
    }

    #[test]
    fn test_cli_from_requires_to() {
        let err = parse(&["--from", "2025-09-01"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_invalid_date_rejected() {
        let err = parse(&["--from", "2025-13-01", "--to", "2025-09-02"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_bad_id_range_rejected() {
        for bad in ["10", "a..b", "5..1"] {
            let err = parse(&["--ids", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{bad}");
        }
    }

    #[test]
    fn test_cli_step_zero_rejected() {
        let err = parse(&["--ids", "0..10", "--step", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = parse(&["--ids", "0..1", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = parse(&["--ids", "0..1", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = parse(&["--ids", "0..1", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["bulkfetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["bulkfetch", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        assert_eq!(parse(&["--ids", "0..1", "-c", "1"]).unwrap().concurrency, Some(1));
        assert_eq!(parse(&["--ids", "0..1", "-c", "100"]).unwrap().concurrency, Some(100));

        for bad in ["0", "101"] {
            let err = parse(&["--ids", "0..1", "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_attempts_bounds() {
        assert_eq!(parse(&["--ids", "0..1", "-r", "5"]).unwrap().max_attempts, Some(5));
        let err = parse(&["--ids", "0..1", "--max-attempts", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rate_limit_and_period() {
        let args = parse(&["--ids", "0..1", "--rate-limit", "5", "--period-ms", "2000"]).unwrap();
        assert_eq!(args.rate_limit, Some(5));
        assert_eq!(args.period_ms, Some(2000));

        let args = parse(&["--ids", "0..1", "-l", "0"]).unwrap();
        assert_eq!(args.rate_limit, Some(0));

        let err = parse(&["--ids", "0..1", "--period-ms", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_header_auth_parses_pair() {
        let args = parse(&["--ids", "0..1", "--header-auth", "X-Api-Key=abc=def"]).unwrap();
        let credential = args.header_auth.unwrap();
        assert_eq!(credential.name, "X-Api-Key");
        assert_eq!(credential.token, "abc=def");
    }

    #[test]
    fn test_cli_auth_modes_conflict() {
        let err = parse(&[
            "--ids",
            "0..1",
            "--header-auth",
            "X-Api-Key=a",
            "--query-auth",
            "api_key=b",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_auth_without_name_rejected() {
        let err = parse(&["--ids", "0..1", "--query-auth", "=token"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_header_auth_rejects_invalid_header_name() {
        let err = parse(&["--ids", "0..1", "--header-auth", "X Api Key=s3cret"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("not a valid HTTP header name"));
    }

    #[test]
    fn test_cli_query_auth_allows_names_that_are_not_headers() {
        let args = parse(&["--ids", "0..1", "--query-auth", "api key=s3cret"]).unwrap();
        assert_eq!(args.query_auth.unwrap().name, "api key");
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = parse_credential("api_key=s3cret").unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("api_key"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_cli_output_and_config_paths() {
        let args = parse(&[
            "--ids",
            "0..1",
            "-o",
            "out.json",
            "--config",
            "bulkfetch.toml",
            "--strict",
            "--fail-fast",
            "--backoff",
        ])
        .unwrap();
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
        assert_eq!(args.config, Some(PathBuf::from("bulkfetch.toml")));
        assert!(args.strict);
        assert!(args.fail_fast);
        assert!(args.backoff);
    }
}
