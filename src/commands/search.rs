// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Search command - cached package index plus an interactive picker
//!
//! The package list of a flake is expensive to produce, so it is kept in the
//! cache for a few days. Selection happens in an external picker (fzf), and
//! metadata for the chosen packages is evaluated concurrently.

use crate::cache::{FileCache, KeyValueCache};
use crate::config::Config;
use crate::exec::CommandLine;
use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::process::Stdio;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Arguments for search
#[derive(Debug, Default)]
pub struct SearchArgs {
    /// Non-interactive filter; interactive picker when absent
    pub query: Option<String>,
    /// Flake to search (config default when absent)
    pub flake: Option<String>,
    /// Cap on results (config default when absent)
    pub max_results: Option<usize>,
    /// Ignore the cached package list
    pub refresh: bool,
    /// Emit JSON
    pub json: bool,
}

/// A package in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Package name
    pub pname: String,
    /// Attribute path inside the flake
    pub attr: String,
    /// Version string
    pub version: String,
    /// Short description
    pub description: String,
}

/// Extra metadata evaluated per selected package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageMeta {
    /// Project homepage
    pub homepage: Option<String>,
    /// License name
    pub license: Option<String>,
}

/// A printed result
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Index entry
    #[serde(flatten)]
    pub package: PackageEntry,
    /// Evaluated metadata
    #[serde(flatten)]
    pub meta: PackageMeta,
}

#[derive(Deserialize)]
struct RawHit {
    pname: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
}

/// Parse `nix search --json` output, one entry per package name
///
/// # Errors
///
/// The output is not the expected JSON object.
pub fn parse_search_json(json: &str) -> Result<Vec<PackageEntry>> {
    let hits: BTreeMap<String, RawHit> =
        serde_json::from_str(json).context("Unexpected output from nix search")?;

    let mut seen = HashSet::new();
    Ok(hits
        .into_iter()
        .filter(|(_, hit)| seen.insert(hit.pname.clone()))
        .map(|(attr, hit)| PackageEntry {
            pname: hit.pname,
            attr,
            version: hit.version,
            description: hit.description,
        })
        .collect())
}

/// Extract homepage and license from an evaluated `meta` attribute set
#[must_use]
pub fn parse_meta(json: &str) -> PackageMeta {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json) else {
        return PackageMeta::default();
    };

    fn first_str(v: &serde_json::Value) -> Option<String> {
        match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items.iter().find_map(first_str),
            _ => None,
        }
    }

    fn license_name(v: &serde_json::Value) -> Option<String> {
        match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(o) => ["spdxId", "fullName", "shortName"]
                .iter()
                .find_map(|k| o.get(*k).and_then(|v| v.as_str()).map(String::from)),
            serde_json::Value::Array(items) => {
                let names: Vec<_> = items.iter().filter_map(license_name).collect();
                (!names.is_empty()).then(|| names.join(", "))
            }
            _ => None,
        }
    }

    PackageMeta {
        homepage: value.get("homepage").and_then(first_str),
        license: value.get("license").and_then(license_name),
    }
}

/// Package list for `flake`, from the cache or freshly produced by `fetch`.
///
/// Unreadable cache entries count as misses.
///
/// # Errors
///
/// `fetch` failed or its output could not be parsed.
pub fn load_packages<C, F>(
    cache: &C,
    flake: &str,
    ttl: chrono::Duration,
    refresh: bool,
    fetch: F,
) -> Result<Vec<PackageEntry>>
where
    C: KeyValueCache,
    F: FnOnce() -> Result<String>,
{
    let key = format!("pkgs-{flake}");

    if !refresh {
        match cache.get::<Vec<PackageEntry>>(&key) {
            Ok(Some(pkgs)) => {
                debug!("Using {} cached packages for {}", pkgs.len(), flake);
                return Ok(pkgs);
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring search cache: {}", e),
        }
    }

    let pkgs = parse_search_json(&fetch()?)?;
    if let Err(e) = cache.set(&key, &pkgs, ttl) {
        warn!("Could not update search cache: {}", e);
    }
    Ok(pkgs)
}

/// Feed `names` to the picker and return the chosen lines
fn pick(picker: &str, names: &[&str], query: Option<&str>) -> Result<Vec<String>> {
    let base = CommandLine::from_words(picker).context("No picker configured")?;
    let mut args: Vec<String> = base.get_args().to_vec();
    args.push("--height=20%".to_string());
    match query {
        Some(q) => args.push(format!("--filter={q}")),
        None => args.push("--multi".to_string()),
    }

    let mut child = std::process::Command::new(base.program())
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {}", base.program()))?;

    if let Some(mut stdin) = child.stdin.take() {
        let input = names.join("\n");
        // The picker may exit before reading everything
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            debug!("Picker closed its input early: {}", e);
        }
    }

    let output = child.wait_with_output().context("Picker failed")?;
    match output.status.code() {
        Some(0) => {}
        Some(1 | 130) => return Ok(Vec::new()),
        _ => anyhow::bail!("Picker exited with {}", output.status),
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

async fn fetch_meta(flake: String, attr: String) -> PackageMeta {
    let installable = format!("{flake}#{attr}.meta");
    let output = tokio::process::Command::new("nix")
        .args(["eval", "--json", &installable])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => parse_meta(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            debug!("nix eval {} failed: {}", installable, out.status);
            PackageMeta::default()
        }
        Err(e) => {
            debug!("nix eval {} failed: {}", installable, e);
            PackageMeta::default()
        }
    }
}

/// Evaluate metadata for all packages concurrently, preserving order
fn fetch_all_meta(flake: &str, packages: &[PackageEntry]) -> Result<Vec<PackageMeta>> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async {
        let mut tasks = JoinSet::new();
        for (i, pkg) in packages.iter().enumerate() {
            let flake = flake.to_string();
            let attr = pkg.attr.clone();
            tasks.spawn(async move { (i, fetch_meta(flake, attr).await) });
        }

        let mut metas = vec![PackageMeta::default(); packages.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, meta)) => metas[i] = meta,
                Err(e) => warn!("Metadata task failed: {}", e),
            }
        }
        Ok(metas)
    })
}

fn print_result(result: &SearchResult) {
    let pkg = &result.package;
    println!();
    println!(
        "{} ({})",
        pkg.pname.if_supports_color(Stream::Stdout, |t| t.bold()),
        pkg.version.if_supports_color(Stream::Stdout, |t| t.green())
    );
    if !pkg.description.is_empty() {
        println!("  {}", pkg.description);
    }
    if let Some(h) = &result.meta.homepage {
        println!("  Homepage: {h}");
    }
    if let Some(l) = &result.meta.license {
        println!("  License: {l}");
    }
}

/// Run the search command
pub fn run(config: &Config, args: SearchArgs) -> Result<()> {
    let flake = args.flake.unwrap_or_else(|| config.search.flake.clone());
    let max_results = args.max_results.unwrap_or(config.search.max_results);
    let cache = FileCache::new(&config.cache_dir);
    let ttl = chrono::Duration::try_seconds(config.search.cache_ttl_secs)
        .unwrap_or_else(|| chrono::Duration::days(3));

    let packages = load_packages(&cache, &flake, ttl, args.refresh, || {
        CommandLine::new("nix")
            .args(["search", "--json", &flake, "^"])
            .message(format!("Indexing packages of {flake}"))
            .run_capture()
    })?;
    info!("{} packages in {}", packages.len(), flake);

    let by_name: BTreeMap<&str, &PackageEntry> =
        packages.iter().map(|p| (p.pname.as_str(), p)).collect();
    let names: Vec<&str> = by_name.keys().copied().collect();

    let mut chosen = pick(&config.tools.picker, &names, args.query.as_deref())?;
    chosen.truncate(max_results);
    chosen.reverse();

    let selected: Vec<PackageEntry> = chosen
        .iter()
        .filter_map(|name| by_name.get(name.as_str()).map(|p| (*p).clone()))
        .collect();
    let metas = fetch_all_meta(&flake, &selected)?;

    let results: Vec<SearchResult> = selected
        .into_iter()
        .zip(metas)
        .map(|(package, meta)| SearchResult { package, meta })
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
    } else {
        for result in &results {
            print_result(result);
        }
        println!();
    }

    Ok(())
}
