use std::{path::PathBuf, process};

use clap::Parser;
use log::{debug, error};
use tokens_sync::{
    bigquery::client::{BigQueryClient, Warehouse},
    db::{prod_db::ProdDb, sds::token_launches_archive::TokenLaunchesArchive},
    document::Document,
    error::SyncError,
    report::Report,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Pull the latest SDS token launches export from BigQuery into the dashboard's json file."
)]
struct Args {
    /// Output JSON file path [default: ./data/tokens-data.json]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verify data freshness
    #[arg(short, long)]
    verify: bool,

    /// Quiet mode, no banner or summary
    #[arg(short, long)]
    quiet: bool,

    /// BigQuery project that owns the table and runs the query
    #[arg(long, env = "TOKENS_SYNC_PROJECT")]
    project: Option<String>,

    /// BigQuery dataset
    #[arg(long, env = "TOKENS_SYNC_DATASET")]
    dataset: Option<String>,

    /// BigQuery table with the json exports
    #[arg(long, env = "TOKENS_SYNC_TABLE")]
    table: Option<String>,
}

impl Args {
    fn archive(&self) -> TokenLaunchesArchive {
        let mut archive = ProdDb::sds_token_launches();
        if let Some(output) = &self.output {
            archive.json_path = output.clone();
        }
        if let Some(project) = &self.project {
            archive.project_id = project.clone();
        }
        if let Some(dataset) = &self.dataset {
            archive.dataset_id = dataset.clone();
        }
        if let Some(table) = &self.table {
            archive.table_id = table.clone();
        }
        archive
    }
}

/// Fetch, verify, persist, then print the summary.
fn run_with(
    archive: &TokenLaunchesArchive,
    warehouse: &impl Warehouse,
    verify: bool,
    report: &Report,
) -> Result<Document, SyncError> {
    let doc = archive.sync(warehouse, verify)?;
    report.summary(&doc, &archive.json_path);
    Ok(doc)
}

fn run(args: &Args) -> Result<Document, SyncError> {
    let archive = args.archive();
    let report = Report::new(args.quiet);
    report.banner();

    let client = BigQueryClient::connect(&archive.project_id)?;
    run_with(&archive, &client, args.verify, &report)
}

fn exit_code_for<T>(outcome: &Result<T, SyncError>) -> i32 {
    match outcome {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}

/// What gets logged at error level for a failed run.  Quiet mode has no say here.
fn failure_lines(e: &SyncError) -> Vec<String> {
    let mut lines = vec![e.to_string()];
    if let Some(hint) = e.hint() {
        lines.push(hint.to_string());
    }
    lines
}

/// Run this job whenever the dashboard data needs a refresh.
fn main() {
    let env_file = dotenvy::dotenv().ok();
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }

    let outcome = run(&args);
    if let Err(e) = &outcome {
        for line in failure_lines(e) {
            error!("{}", line);
        }
    }
    process::exit(exit_code_for(&outcome));
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs, path::Path};

    use tokens_sync::bigquery::{
        auth::AuthError,
        client::{Cell, QueryError, Row},
    };

    use super::*;

    struct FixtureTable(Vec<Row>);

    impl Warehouse for FixtureTable {
        fn query(&self, _sql: &str) -> Result<Vec<Row>, QueryError> {
            Ok(self.0.clone())
        }
    }

    fn export_row() -> Row {
        let cell = |name: &str, field_type: &str, value: &str| Cell {
            name: name.into(),
            field_type: field_type.into(),
            value: serde_json::Value::String(value.into()),
        };
        Row::new(vec![
            cell("json_data", "STRING", r#"{"recordCount": 3, "lastUpdated": "2024-06-01T14:00:00Z"}"#),
            cell("record_count", "INTEGER", "3"),
            cell("last_updated", "TIMESTAMP", "1717250400000000"),
            cell("export_timestamp", "TIMESTAMP", "1717250460000000"),
        ])
    }

    fn archive_in(dir: &Path) -> TokenLaunchesArchive {
        TokenLaunchesArchive {
            json_path: dir.join("data").join("tokens-data.json"),
            ..ProdDb::sds_token_launches()
        }
    }

    #[test]
    fn successful_run_exits_zero() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = archive_in(dir.path());
        for quiet in [false, true] {
            let outcome = run_with(
                &archive,
                &FixtureTable(vec![export_row()]),
                true,
                &Report::new(quiet),
            );
            assert_eq!(exit_code_for(&outcome), 0);
        }
        assert!(archive.json_path.exists());
        assert!(archive.backup_path().exists());
        Ok(())
    }

    #[test]
    fn empty_result_exits_one_quiet_or_not() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = archive_in(dir.path());
        let mut lines = vec![];
        for quiet in [false, true] {
            let outcome = run_with(&archive, &FixtureTable(vec![]), false, &Report::new(quiet));
            assert_eq!(exit_code_for(&outcome), 1);
            lines.push(failure_lines(outcome.as_ref().unwrap_err()));
        }
        assert_eq!(lines[0], lines[1]);
        assert_eq!(
            lines[0],
            vec!["No data found in BigQuery table aff-2025-fe-14wnaz.sds_tokens.token_launches_json"]
        );
        assert!(!archive.json_path.exists());
        Ok(())
    }

    #[test]
    fn persist_failure_exits_one_quiet_or_not() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        // a plain file where the data directory should be
        fs::write(dir.path().join("data"), "")?;
        let archive = archive_in(dir.path());
        let mut lines = vec![];
        for quiet in [false, true] {
            let outcome = run_with(
                &archive,
                &FixtureTable(vec![export_row()]),
                false,
                &Report::new(quiet),
            );
            let err = outcome.as_ref().unwrap_err();
            assert!(matches!(err, SyncError::Persist { .. }));
            assert_eq!(exit_code_for(&outcome), 1);
            lines.push(failure_lines(err));
        }
        assert_eq!(lines[0], lines[1]);
        Ok(())
    }

    #[test]
    fn auth_failure_lines_carry_the_hint() {
        let outcome: Result<Document, SyncError> = Err(AuthError::NoCredentials.into());
        assert_eq!(exit_code_for(&outcome), 1);
        assert_eq!(
            failure_lines(outcome.as_ref().unwrap_err()),
            vec![
                "Failed to authenticate with default credentials: could not find default credentials",
                "Run: gcloud auth application-default login",
            ]
        );
    }

    #[test]
    fn short_flags() {
        let args = Args::try_parse_from(["update_tokens_data", "-o", "out/tokens.json", "-v", "-q"])
            .unwrap();
        assert!(args.verify);
        assert!(args.quiet);
        assert_eq!(args.archive().json_path, PathBuf::from("out/tokens.json"));
    }

    #[test]
    fn defaults_come_from_prod_db() {
        let args = Args::try_parse_from(["update_tokens_data"]).unwrap();
        assert!(!args.verify);
        assert!(!args.quiet);
        assert_eq!(args.output, None);
        assert_eq!(args.archive().json_path, ProdDb::sds_token_launches().json_path);
    }

    #[test]
    fn table_overrides() {
        let args = Args::try_parse_from([
            "update_tokens_data",
            "--project",
            "fixture-project",
            "--dataset",
            "fixtures",
            "--table",
            "token_launches_json_test",
        ])
        .unwrap();
        assert_eq!(
            args.archive().table_ref(),
            "fixture-project.fixtures.token_launches_json_test"
        );
    }

    #[test]
    fn verify_api() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
