//! Git transport: clone, branch checkout, commit and push via git2.
//!
//! Authentication is chosen once per invocation by [`select_auth`] and
//! handed to every network call; there is no fallback chain across methods.
//! Transport failures are classified into authentication, not-found and
//! non-fast-forward errors so the CLI can print specific guidance.

use std::fmt;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, ErrorClass, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature,
};
use tracing::{debug, info};

/// Username sent with token authentication.
pub const TOKEN_USERNAME: &str = "x-access-token";

const REMOTE_NAME: &str = "origin";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication failed for {url}: {message}")]
    AuthenticationFailure { url: String, message: String },

    #[error("repository not found: {url}")]
    RepositoryNotFound { url: String },

    #[error("push to {branch} rejected (non-fast-forward): {message}")]
    NonFastForward { branch: String, message: String },

    #[error("branch {branch} does not exist on {url}")]
    BranchNotFound { url: String, branch: String },

    #[error("git error: {0}")]
    Transport(#[from] git2::Error),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Transport failure classes recognised in git error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    NotFound,
    NonFastForward,
    Other,
}

/// Classify a transport error message by the substrings hosts use.
#[must_use]
pub fn classify_message(message: &str) -> FailureKind {
    let msg = message.to_ascii_lowercase();
    if ["authentication", "auth required", "401", "403", "permission denied", "credentials"]
        .iter()
        .any(|s| msg.contains(s))
    {
        FailureKind::Authentication
    } else if [
        "not found",
        "404",
        "does not appear to be a git repository",
        "failed to resolve path",
        "could not find repository",
    ]
    .iter()
    .any(|s| msg.contains(s))
    {
        FailureKind::NotFound
    } else if ["non-fast-forward", "non-fastforward", "fetch first"]
        .iter()
        .any(|s| msg.contains(s))
    {
        FailureKind::NonFastForward
    } else {
        FailureKind::Other
    }
}

impl RemoteError {
    /// Map a git2 error from a network operation against `url`.
    #[must_use]
    pub fn classify(url: &str, branch: &str, err: git2::Error) -> Self {
        let kind = match err.code() {
            ErrorCode::Auth => FailureKind::Authentication,
            _ if local_path(url).is_some_and(|path| !path.exists()) => FailureKind::NotFound,
            ErrorCode::NotFastForward => FailureKind::NonFastForward,
            _ if err.class() == ErrorClass::Ssh && err.message().contains("key") => {
                FailureKind::Authentication
            }
            _ => classify_message(err.message()),
        };
        match kind {
            FailureKind::Authentication => Self::AuthenticationFailure {
                url: url.to_string(),
                message: err.message().to_string(),
            },
            FailureKind::NotFound => Self::RepositoryNotFound {
                url: url.to_string(),
            },
            FailureKind::NonFastForward => Self::NonFastForward {
                branch: branch.to_string(),
                message: err.message().to_string(),
            },
            FailureKind::Other => Self::Transport(err),
        }
    }
}

/// Filesystem path named by a local remote URL: a `file://` URL or a plain
/// path. `None` for network URLs, including scp-style `host:path`.
fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        return None;
    }
    let path = Path::new(url);
    if path.is_absolute() || url.starts_with('.') || !url.contains(':') {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Credentials supplied by flags or environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_key: Option<PathBuf>,
}

/// The single authentication method used for one invocation.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// HTTP basic with [`TOKEN_USERNAME`] and the token as password.
    Token(String),
    UserPass { username: String, password: String },
    SshKey { path: PathBuf },
    Anonymous,
}

impl AuthMethod {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::UserPass { .. } => "password",
            Self::SshKey { .. } => "ssh-key",
            Self::Anonymous => "anonymous",
        }
    }
}

// Keeps secrets out of logs.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SshKey { path } => write!(f, "SshKey({})", path.display()),
            other => f.write_str(other.kind()),
        }
    }
}

/// Pick the authentication method.
///
/// Token, then username and password, then an explicit key, then the
/// default key material if any was found, then anonymous.
#[must_use]
pub fn select_auth(creds: &Credentials, default_key: Option<PathBuf>) -> AuthMethod {
    if let Some(token) = creds.token.as_ref().filter(|t| !t.is_empty()) {
        return AuthMethod::Token(token.clone());
    }
    if let (Some(username), Some(password)) = (&creds.username, &creds.password) {
        return AuthMethod::UserPass {
            username: username.clone(),
            password: password.clone(),
        };
    }
    if let Some(path) = &creds.ssh_key {
        return AuthMethod::SshKey { path: path.clone() };
    }
    default_key.map_or(AuthMethod::Anonymous, |path| AuthMethod::SshKey { path })
}

fn callbacks(auth: &AuthMethod) -> RemoteCallbacks<'_> {
    let mut cb = RemoteCallbacks::new();
    let mut attempts = 0u32;
    cb.credentials(move |_url, username_from_url, _allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::from_str("authentication failed: credentials rejected"));
        }
        match auth {
            AuthMethod::Token(token) => Cred::userpass_plaintext(TOKEN_USERNAME, token),
            AuthMethod::UserPass { username, password } => Cred::userpass_plaintext(username, password),
            AuthMethod::SshKey { path } => {
                Cred::ssh_key(username_from_url.unwrap_or("git"), None, path, None)
            }
            AuthMethod::Anonymous => Cred::default(),
        }
    });
    cb.push_update_reference(|refname, status| match status {
        Some(msg) => Err(git2::Error::from_str(&format!("{refname} rejected: {msg}"))),
        None => Ok(()),
    });
    cb
}

/// Clone `url` into `dest`.
///
/// # Errors
///
/// Returns a classified error if the clone fails.
pub fn clone_repo(url: &str, dest: &Path, auth: &AuthMethod) -> RemoteResult<Repository> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks(auth));

    info!(url, auth = auth.kind(), "cloning");
    RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, dest)
        .map_err(|e| RemoteError::classify(url, "", e))
}

/// Clone `url`, or initialize a fresh repository with `url` as its remote
/// when the remote does not exist yet.
///
/// # Errors
///
/// Returns any clone error other than not-found.
pub fn clone_or_init(url: &str, dest: &Path, auth: &AuthMethod) -> RemoteResult<Repository> {
    match clone_repo(url, dest, auth) {
        Err(RemoteError::RepositoryNotFound { .. }) => {
            info!(url, "remote not found, initializing a new repository");
            let repo = Repository::init(dest)?;
            repo.remote(REMOTE_NAME, url)?;
            Ok(repo)
        }
        other => other,
    }
}

/// Whether HEAD points at a commit yet.
#[must_use]
pub fn head_is_born(repo: &Repository) -> bool {
    repo.head().is_ok_and(|h| h.target().is_some())
}

/// Check out `branch`.
///
/// Uses the remote branch if it exists. Otherwise, when `create` is set,
/// starts the branch from the current HEAD (or as an unborn branch in an
/// empty repository).
///
/// # Errors
///
/// Returns `BranchNotFound` when the branch is missing and `create` is false.
pub fn checkout_branch(repo: &Repository, url: &str, branch: &str, create: bool) -> RemoteResult<()> {
    let local_ref = format!("refs/heads/{branch}");

    if repo.find_branch(branch, BranchType::Local).is_err() {
        let remote_name = format!("{REMOTE_NAME}/{branch}");
        if let Ok(remote_branch) = repo.find_branch(&remote_name, BranchType::Remote) {
            let commit = remote_branch.get().peel_to_commit()?;
            let mut local = repo.branch(branch, &commit, false)?;
            local.set_upstream(Some(&remote_name))?;
        } else if !create {
            if head_is_born(repo) {
                return Err(RemoteError::BranchNotFound {
                    url: url.to_string(),
                    branch: branch.to_string(),
                });
            }
        } else if head_is_born(repo) {
            let commit = repo.head()?.peel_to_commit()?;
            repo.branch(branch, &commit, false)?;
        }
    }

    repo.set_head(&local_ref)?;
    if head_is_born(repo) {
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
    }
    debug!(branch, "checked out");
    Ok(())
}

/// Stage everything in the working tree and commit it.
///
/// Returns `None` when the tree is unchanged from HEAD.
///
/// # Errors
///
/// Returns an error if the index or commit cannot be written.
pub fn commit_all(repo: &Repository, message: &str) -> RemoteResult<Option<Oid>> {
    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"], None)?;
    index.write()?;
    let tree_id = index.write_tree()?;

    let parent = if head_is_born(repo) {
        Some(repo.head()?.peel_to_commit()?)
    } else {
        None
    };
    if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
        debug!("tree unchanged, nothing to commit");
        return Ok(None);
    }

    let tree = repo.find_tree(tree_id)?;
    let sig = repo
        .signature()
        .or_else(|_| Signature::now("tablesync", "tablesync@localhost"))?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    info!(commit = %oid, "created commit");
    Ok(Some(oid))
}

/// Push `branch` to the remote.
///
/// # Errors
///
/// Returns a classified error if the push is refused or fails.
pub fn push_branch(
    repo: &Repository,
    url: &str,
    branch: &str,
    force: bool,
    auth: &AuthMethod,
) -> RemoteResult<()> {
    let mut remote = repo.find_remote(REMOTE_NAME)?;
    let refspec = format!(
        "{}refs/heads/{branch}:refs/heads/{branch}",
        if force { "+" } else { "" }
    );
    let mut opts = PushOptions::new();
    opts.remote_callbacks(callbacks(auth));

    info!(url, branch, force, auth = auth.kind(), "pushing");
    remote
        .push(&[refspec.as_str()], Some(&mut opts))
        .map_err(|e| RemoteError::classify(url, branch, e))
}
