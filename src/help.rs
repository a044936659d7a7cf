//! Resolution of the documentation URL behind `/config-help.html`.

use std::path::Path;
use std::time::Duration;

use crate::host::{self, CommandError};
use crate::settings::HelpSettings;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum HelpError {
    #[error("invalid module name: {0:?}")]
    InvalidModule(String),
    #[error("module {0} has no git remote")]
    NoRemote(String),
    #[error(transparent)]
    Git(#[from] CommandError),
}

/// Turn a fetch URL into a browsable https URL.
///
/// `git@host:owner/repo.git` becomes `https://host/owner/repo`; a trailing
/// `.git` is dropped from any form.
pub fn normalize_remote(url: &str) -> String {
    let url = url.trim();
    let url = url.strip_suffix(".git").unwrap_or(url);
    match url.strip_prefix("git@") {
        Some(rest) => match rest.split_once(':') {
            Some((host, path)) => format!("https://{host}/{path}"),
            None => format!("https://{rest}"),
        },
        None => url.to_string(),
    }
}

/// First fetch URL in `git remote -v` output.
fn first_fetch_url(remote_listing: &str) -> Option<&str> {
    remote_listing
        .lines()
        .filter(|l| l.ends_with("(fetch)"))
        .chain(remote_listing.lines())
        .find_map(|l| l.split_whitespace().nth(1))
}

async fn head_revision(git: &str, repo: &Path) -> Result<String, CommandError> {
    let out = host::run(git, &["rev-parse", "HEAD"], Some(repo), GIT_TIMEOUT).await?;
    Ok(out.trim().to_string())
}

/// Where to send the user for documentation on `module`.
pub async fn help_url(
    help: &HelpSettings,
    git: &str,
    modules_dir: &Path,
    module: &str,
) -> Result<String, HelpError> {
    if module.is_empty() || module.contains(|c: char| c == '/' || c == '\\') || module == ".." || module == "." {
        return Err(HelpError::InvalidModule(module.to_string()));
    }

    if help.default_modules.iter().any(|m| m == module) {
        let rev = head_revision(git, modules_dir).await?;
        return Ok(format!(
            "{}/tree/{}/modules/default/{}",
            help.core_repository.trim_end_matches('/'),
            rev,
            module
        ));
    }

    let repo = modules_dir.join(module);
    let listing = host::run(git, &["remote", "-v"], Some(&repo), GIT_TIMEOUT).await?;
    let fetch = first_fetch_url(&listing).ok_or_else(|| HelpError::NoRemote(module.to_string()))?;
    let base = normalize_remote(fetch);
    let rev = head_revision(git, &repo).await?;
    Ok(format!("{base}/tree/{rev}"))
}
