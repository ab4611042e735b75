use semver::Version;

/// Development branches are always named `dev/<version>`.
pub const DEV_BRANCH_PREFIX: &str = "dev/";

/// Release tags are always named `release/<version>`.
pub const RELEASE_TAG_PREFIX: &str = "release/";

/// Formats the development branch name for a version.
pub fn dev_branch(version: &Version) -> String {
    format!("{}{}", DEV_BRANCH_PREFIX, version)
}

/// Formats the release tag name for a version.
pub fn release_tag(version: &Version) -> String {
    format!("{}{}", RELEASE_TAG_PREFIX, version)
}

/// Parses a release version out of a tag or full ref name.
///
/// Accepts both `release/1.2.3` and `refs/tags/release/1.2.3`; anything else
/// (other tags, malformed versions) yields `None`.
pub fn parse_release_ref(name: &str) -> Option<Version> {
    let name = name.strip_prefix("refs/tags/").unwrap_or(name);
    let version = name.strip_prefix(RELEASE_TAG_PREFIX)?;
    Version::parse(version).ok()
}

/// Finds the highest released version among remote refs.
///
/// Ordering is semantic, not lexical: `release/1.10.0` beats `release/1.9.0`.
pub fn max_release_version(refs: &[String]) -> Option<Version> {
    refs.iter().filter_map(|r| parse_release_ref(r)).max()
}

/// The kind of semver increment offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpKind {
    Patch,
    Minor,
    Major,
}

impl BumpKind {
    pub const ALL: [BumpKind; 3] = [BumpKind::Patch, BumpKind::Minor, BumpKind::Major];

    pub fn label(self) -> &'static str {
        match self {
            BumpKind::Patch => "patch",
            BumpKind::Minor => "minor",
            BumpKind::Major => "major",
        }
    }

    /// Applies the increment, resetting lower components to zero.
    pub fn apply(self, version: &Version) -> Version {
        match self {
            BumpKind::Patch => Version::new(version.major, version.minor, version.patch + 1),
            BumpKind::Minor => Version::new(version.major, version.minor + 1, 0),
            BumpKind::Major => Version::new(version.major + 1, 0, 0),
        }
    }
}

/// One selectable increment relative to the latest release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpChoice {
    pub kind: BumpKind,
    pub version: Version,
}

/// Outcome of version negotiation against the remote release history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPlan {
    /// The local version is usable as-is; work on `dev/<local>`.
    Keep { branch: String },
    /// The remote has released at or past the local version; the operator
    /// must pick an increment of the latest release.
    Bump {
        release_version: Version,
        choices: Vec<BumpChoice>,
    },
}

/// Computes the development branch (and whether a bump is required) from the
/// local version and the remote ref list.
///
/// - No `release/X.Y.Z` tag on the remote: keep the local version.
/// - Local version strictly greater than the latest release: keep it.
/// - Otherwise: offer patch/minor/major increments of the latest release.
pub fn resolve(local: &Version, remote_refs: &[String]) -> VersionPlan {
    match max_release_version(remote_refs) {
        None => VersionPlan::Keep {
            branch: dev_branch(local),
        },
        Some(release_version) if local > &release_version => VersionPlan::Keep {
            branch: dev_branch(local),
        },
        Some(release_version) => {
            let choices = BumpKind::ALL
                .iter()
                .map(|&kind| BumpChoice {
                    kind,
                    version: kind.apply(&release_version),
                })
                .collect();
            VersionPlan::Bump {
                release_version,
                choices,
            }
        }
    }
}
