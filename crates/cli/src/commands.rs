#![forbid(unsafe_code)]

//! One function per subcommand. Each writes its report to `out` and leaves
//! logging to `tracing`.

use anyhow::{Context, bail};
use config::Config;
use scanner::{CommandOutput, DATA_FILE_NAME, Error as ScanError, ScannerCommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use webservice::{ServerProxy, StudentRecord};

fn scanner_binary(config: &Config) -> anyhow::Result<&Path> {
    config.scanner.binary.as_deref().context(
        "no fpscan binary found; install it on $PATH or set `scanner.binary` in the config file",
    )
}

/// Point configuration problems at the setting to fix.
fn explain(err: ScanError) -> anyhow::Error {
    if err.is_configuration_error() {
        anyhow::Error::new(err).context("check `scanner.binary` in the config file")
    } else {
        err.into()
    }
}

fn connect(config: &Config) -> anyhow::Result<ServerProxy> {
    let url = webservice::url_from_config(&config.server)?;
    Ok(ServerProxy::new(&url, config.server.request_timeout)?)
}

/// Where scans are written and read back from.
pub fn workdir(config: &Config) -> PathBuf {
    config
        .scanner
        .workdir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn detect(config: &Config, out: &mut impl Write) -> anyhow::Result<()> {
    let scanners = scanner::detect_scanners(scanner_binary(config)?).map_err(explain)?;
    if scanners.is_empty() {
        writeln!(out, "no scanners detected")?;
    }
    for name in scanners {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

/// Run a scanner command to completion. Ctrl-C kills it.
async fn supervise(command: ScannerCommand) -> anyhow::Result<CommandOutput> {
    command.start()?;
    let result = tokio::select! {
        result = command.wait_checked() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, killing scanner");
            command.kill();
            command.wait().await?;
            bail!("scan aborted");
        }
    };
    match result {
        Err(ScanError::Killed { timeout: Some(timeout) }) => {
            bail!("no finger detected within {timeout:?}")
        }
        Err(ScanError::ScanFailure { code, stderr }) => {
            bail!("scanner failed with exit code {code}: {stderr}")
        }
        other => Ok(other?),
    }
}

pub async fn scan(
    config: &Config,
    timeout: Option<Duration>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let timeout = timeout.unwrap_or(config.scanner.scan_timeout);
    let workdir = workdir(config);
    let command = ScannerCommand::scan(scanner_binary(config)?, Some(&workdir), Some(timeout))
        .map_err(explain)?;
    let data_file = command.data_file();

    writeln!(out, "place your finger on the scanner")?;
    out.flush()?;
    supervise(command).await?;
    if !data_file.exists() {
        warn!(?data_file, "scanner succeeded without writing data");
        bail!("scanner did not write {}", data_file.display());
    }
    writeln!(out, "{}", data_file.display())?;
    Ok(())
}

pub async fn compare(
    config: &Config,
    stored: &Path,
    timeout: Option<Duration>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let timeout = timeout.unwrap_or(config.scanner.scan_timeout);
    let command = ScannerCommand::compare(scanner_binary(config)?, stored, Some(timeout))
        .map_err(explain)?
        .in_dir(workdir(config));

    writeln!(out, "place your finger on the scanner")?;
    out.flush()?;
    supervise(command).await?;
    writeln!(out, "fingerprints match")?;
    Ok(())
}

pub async fn store(
    config: &Config,
    student: &str,
    finger: u8,
    file: Option<&Path>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let file = file.map_or_else(|| workdir(config).join(DATA_FILE_NAME), Path::to_path_buf);
    let proxy = connect(config)?;
    let stored = webservice::store_fingerprint_with(&proxy, student, finger, &file).await?;
    if stored {
        writeln!(out, "stored finger {finger} of {student}")?;
    } else {
        writeln!(out, "nothing stored for {student}")?;
    }
    Ok(())
}

pub async fn fetch(config: &Config, student: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let proxy = connect(config)?;
    let record = webservice::fetch_fingerprints_with(&proxy, student).await?;
    report(student, &record, out)?;
    Ok(())
}

pub async fn ping(config: &Config, out: &mut impl Write) -> anyhow::Result<()> {
    let proxy = connect(config)?;
    webservice::ping_with(&proxy).await?;
    writeln!(out, "{} is up", proxy.endpoint())?;
    Ok(())
}

fn report(student: &str, record: &StudentRecord, out: &mut impl Write) -> std::io::Result<()> {
    if record.is_empty() {
        return writeln!(out, "no such student: {student}");
    }
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".into());
    writeln!(out, "student:   {student}")?;
    writeln!(
        out,
        "name:      {} {}",
        field(&record.firstname),
        field(&record.lastname)
    )?;
    writeln!(out, "email:     {}", field(&record.email))?;
    match &record.img {
        Some(img) => writeln!(out, "image:     {} ({} bytes)", field(&record.img_name), img.len())?,
        None => writeln!(out, "image:     -")?,
    }
    if record.fingerprints.is_empty() {
        writeln!(out, "fingers:   none stored")?;
    }
    for (slot, data) in &record.fingerprints {
        writeln!(out, "finger {slot:>2}: {} bytes", data.len())?;
    }
    Ok(())
}
