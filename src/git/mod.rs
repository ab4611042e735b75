//! Git repository access.
//!
//! [`GitRepo`] wraps `git2::Repository` with the operations the publish
//! workflow needs: status and staging, branch checkout, pull (fetch + merge),
//! push, stash handling, and tag management. The workflow state machine
//! itself lives in [`workflow`].

pub mod workflow;

use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Repository, StatusOptions};

use crate::error::{CliError, Result};

/// The only remote the workflow talks to.
pub const REMOTE_NAME: &str = "origin";

/// Builds the credential callbacks used for every remote operation.
///
/// Tries SSH keys from `~/.ssh` in order of preference, then the SSH agent,
/// then default credentials.
fn remote_callbacks() -> git2::RemoteCallbacks<'static> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            let key_paths = vec![
                format!("{}/.ssh/id_ed25519", home),
                format!("{}/.ssh/id_rsa", home),
                format!("{}/.ssh/id_ecdsa", home),
            ];

            for key_path in key_paths {
                let path = std::path::Path::new(&key_path);
                if path.exists() {
                    if let Ok(cred) = git2::Cred::ssh_key(
                        username_from_url.unwrap_or("git"),
                        None,
                        path,
                        None,
                    ) {
                        return Ok(cred);
                    }
                }
            }

            if let Ok(cred) = git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")) {
                return Ok(cred);
            }
        }

        git2::Cred::default()
    });
    callbacks
}

/// Wrapper around git2::Repository for the publish workflow.
pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Opens the repository at `dir`, initializing one if none exists.
    pub fn init_or_open(dir: &Path) -> Result<Self> {
        let repo = match Repository::open(dir) {
            Ok(repo) => repo,
            Err(_) => Repository::init(dir)?,
        };
        Ok(GitRepo { repo })
    }

    /// Creates or repoints the `origin` remote.
    pub fn ensure_remote(&self, url: &str) -> Result<()> {
        match self.repo.find_remote(REMOTE_NAME) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    self.repo.remote_set_url(REMOTE_NAME, url)?;
                }
            }
            Err(_) => {
                self.repo.remote(REMOTE_NAME, url)?;
            }
        }
        Ok(())
    }

    /// Short name of the currently checked-out branch.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| CliError::remote_state("HEAD is detached or invalid"))
    }

    /// Paths the working tree reports as conflicted.
    pub fn conflicted_paths(&self) -> Result<Vec<String>> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;

        let mut paths = Vec::new();
        for entry in statuses.iter() {
            if entry.status().contains(git2::Status::CONFLICTED) {
                if let Some(path) = entry.path() {
                    paths.push(path.to_string());
                }
            }
        }
        Ok(paths)
    }

    /// Stages every added, modified, deleted, and renamed path.
    ///
    /// # Returns
    /// * `Ok(true)` - The index now differs from HEAD (something to commit)
    /// * `Ok(false)` - Working tree was clean
    pub fn stage_changes(&self) -> Result<bool> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        // Unborn branch: anything in the index is a pending change.
        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(_) => None,
        };
        if head_tree.is_none() {
            return Ok(index.len() > 0);
        }

        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Commits the current index on HEAD.
    pub fn commit(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.repo.signature()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(())
    }

    /// Pops the newest stash entry if one exists.
    ///
    /// # Returns
    /// * `Ok(true)` - A stash entry was popped (may reintroduce conflicts)
    /// * `Ok(false)` - No stash entries
    pub fn stash_pop_if_any(&mut self) -> Result<bool> {
        let mut count = 0usize;
        self.repo.stash_foreach(|_, _, _| {
            count += 1;
            true
        })?;
        if count == 0 {
            return Ok(false);
        }
        self.repo.stash_pop(0, None)?;
        Ok(true)
    }

    pub fn local_branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Switches to a branch, creating it from the current HEAD if it does not
    /// exist locally.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        if !self.local_branch_exists(name) {
            let head = self.repo.head()?.peel_to_commit()?;
            self.repo.branch(name, &head, false)?;
        }
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::default().safe()))?;
        Ok(())
    }

    pub fn delete_local_branch(&self, name: &str) -> Result<()> {
        let mut branch = self.repo.find_branch(name, BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    /// Lists every ref name advertised by the remote (branches and tags).
    pub fn list_remote_refs(&self) -> Result<Vec<String>> {
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        let connection =
            remote.connect_auth(git2::Direction::Fetch, Some(remote_callbacks()), None)?;
        let refs = connection
            .list()?
            .iter()
            .map(|head| head.name().to_string())
            .collect();
        Ok(refs)
    }

    /// Fetches one branch from origin into its remote-tracking ref.
    pub fn fetch_branch(&self, branch: &str) -> std::result::Result<(), git2::Error> {
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(remote_callbacks());
        let refspec = format!("+refs/heads/{}:refs/remotes/{}/{}", branch, REMOTE_NAME, branch);
        remote.fetch(&[refspec.as_str()], Some(&mut options), None)
    }

    /// Whether origin has a remote-tracking ref for `branch` after a fetch.
    pub fn remote_tracking_exists(&self, branch: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/remotes/{}/{}", REMOTE_NAME, branch))
            .is_ok()
    }

    /// Merges the remote-tracking ref of `branch` into the current branch.
    ///
    /// Fast-forwards when possible; a conflicted normal merge is fatal and
    /// left in place for manual resolution.
    pub fn merge_remote_branch(&self, branch: &str) -> Result<()> {
        let reference = self
            .repo
            .find_reference(&format!("refs/remotes/{}/{}", REMOTE_NAME, branch))?;
        let annotated = self.repo.reference_to_annotated_commit(&reference)?;
        self.merge_annotated(&annotated, &format!("{}/{}", REMOTE_NAME, branch))
    }

    /// Merges a local branch into the current branch.
    pub fn merge_local_branch(&self, branch: &str) -> Result<()> {
        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{}", branch))?;
        let annotated = self.repo.reference_to_annotated_commit(&reference)?;
        self.merge_annotated(&annotated, branch)
    }

    fn merge_annotated(&self, annotated: &git2::AnnotatedCommit, label: &str) -> Result<()> {
        let (analysis, _) = self.repo.merge_analysis(&[annotated])?;

        if analysis.is_up_to_date() {
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let current = self.current_branch()?;
            let mut reference = self
                .repo
                .find_reference(&format!("refs/heads/{}", current))?;
            reference.set_target(annotated.id(), &format!("fast-forward from {}", label))?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(());
        }

        self.repo.merge(
            &[annotated],
            None,
            Some(CheckoutBuilder::default().allow_conflicts(true)),
        )?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            // Leave the conflicted index for manual resolution.
            return Err(CliError::conflict(format!(
                "merge of {} produced conflicts; resolve them manually and retry",
                label
            )));
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.repo.signature()?;
        let head_commit = self.repo.head()?.peel_to_commit()?;
        let merged_commit = self.repo.find_commit(annotated.id())?;
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge {}", label),
            &tree,
            &[&head_commit, &merged_commit],
        )?;
        self.repo.cleanup_state()?;
        Ok(())
    }

    /// Pushes a local branch to origin.
    pub fn push_branch(&self, branch: &str) -> std::result::Result<(), git2::Error> {
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        self.push_refspec(&refspec)
    }

    /// Deletes a branch on origin.
    pub fn delete_remote_branch(&self, branch: &str) -> std::result::Result<(), git2::Error> {
        self.push_refspec(&format!(":refs/heads/{}", branch))
    }

    pub fn local_tag_exists(&self, name: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/tags/{}", name))
            .is_ok()
    }

    pub fn delete_local_tag(&self, name: &str) -> Result<()> {
        self.repo.tag_delete(name)?;
        Ok(())
    }

    /// Creates a lightweight tag on the current HEAD commit.
    pub fn create_tag(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.tag_lightweight(name, head.as_object(), false)?;
        Ok(())
    }

    pub fn push_tag(&self, name: &str) -> std::result::Result<(), git2::Error> {
        self.push_refspec(&format!("refs/tags/{}:refs/tags/{}", name, name))
    }

    /// Deletes a tag on origin.
    pub fn delete_remote_tag(&self, name: &str) -> std::result::Result<(), git2::Error> {
        self.push_refspec(&format!(":refs/tags/{}", name))
    }

    fn push_refspec(&self, refspec: &str) -> std::result::Result<(), git2::Error> {
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        let mut options = git2::PushOptions::new();
        let mut callbacks = remote_callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(status) = status {
                Err(git2::Error::from_str(&format!(
                    "push rejected for {}: {}",
                    refname, status
                )))
            } else {
                Ok(())
            }
        });
        options.remote_callbacks(callbacks);
        remote.push(&[refspec], Some(&mut options))
    }
}
