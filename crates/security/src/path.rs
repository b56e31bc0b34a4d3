//! Path confinement — C2 of the gateway design: every tool-supplied path must
//! resolve to a descendant of the vault root, surviving both lexical `..`
//! tricks and symlink escapes.
//!
//! Two entry points are exposed: [`resolve_within_vault`] does lexical
//! normalization only (cheap, used when the caller has already checked the
//! target exists under the root), and [`resolve_within_vault_safe`] adds the
//! symlink-canonicalizing pass spec.md §4.2 calls "a safer variant" — it
//! canonicalizes the resolved path (or, if the path doesn't exist yet, the
//! nearest existing ancestor) and repeats the confinement check against that
//! canonical form. Tool handlers should call the safe variant; the cheap one
//! exists for call sites (tests, dry-run previews) that never touch disk.

use std::path::{Component, Path, PathBuf};

/// Directory names a resolved path may never contain as a component, at any
/// depth. `.git` is non-negotiable (the vault's own VCS metadata); the second
/// name is configurable by the caller (e.g. a `.vaultgate` control directory).
pub const DEFAULT_FORBIDDEN_DIRS: &[&str] = &[".git", ".vaultgate"];

#[derive(Debug, Clone, thiserror::Error)]
pub enum PathValidationError {
    #[error("path must not be empty")]
    Empty,

    #[error("path escapes the vault root: {0}")]
    PathEscape(String),

    #[error("path touches a forbidden directory '{component}': {path}")]
    ForbiddenComponent { path: String, component: String },

    #[error("failed to canonicalize '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Lexically normalize `user_path` against `vault_root` and confirm the
/// result is the root itself or a descendant, with no forbidden component.
///
/// Does not touch the filesystem beyond the caller-provided `vault_root`
/// (which is assumed already canonical). Vulnerable, on its own, to a
/// symlink planted inside the vault pointing outside it — see
/// [`resolve_within_vault_safe`] for the hardened variant.
pub fn resolve_within_vault(
    vault_root: &Path,
    user_path: &str,
    forbidden_dirs: &[&str],
) -> Result<PathBuf, PathValidationError> {
    if user_path.trim().is_empty() {
        return Err(PathValidationError::Empty);
    }

    check_forbidden_components(user_path, forbidden_dirs)?;

    let joined = vault_root.join(user_path);
    let normalized = lexically_normalize(&joined);

    if !is_descendant_or_equal(vault_root, &normalized) {
        return Err(PathValidationError::PathEscape(user_path.to_string()));
    }

    check_forbidden_components_in_path(&normalized, vault_root, forbidden_dirs, user_path)?;

    Ok(normalized)
}

/// As [`resolve_within_vault`], then additionally canonicalizes symlinks on
/// the resolved path (or the nearest existing ancestor, walking up toward the
/// filesystem root, when the path itself doesn't exist yet — e.g. a write to
/// a new file) and repeats the confinement check against that canonical
/// form. This is the variant tool handlers must use: lexical normalization
/// alone cannot see a symlink inside the vault that points outside it.
pub fn resolve_within_vault_safe(
    vault_root: &Path,
    user_path: &str,
    forbidden_dirs: &[&str],
) -> Result<PathBuf, PathValidationError> {
    let lexical = resolve_within_vault(vault_root, user_path, forbidden_dirs)?;

    let canonical_root = vault_root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: vault_root.display().to_string(),
            reason: e.to_string(),
        })?;

    let canonical_target = canonicalize_nearest_existing_ancestor(&lexical)?;

    if !is_descendant_or_equal(&canonical_root, &canonical_target) {
        return Err(PathValidationError::PathEscape(user_path.to_string()));
    }

    Ok(lexical)
}

/// Walk from `path` upward until an ancestor that exists is found, canonicalize
/// that ancestor, then re-append the non-existent suffix. Terminates at the
/// filesystem root: an ancestor chain always bottoms out at `/` (or a drive
/// root), which always exists, so this loop cannot run unbounded.
fn canonicalize_nearest_existing_ancestor(path: &Path) -> Result<PathBuf, PathValidationError> {
    if path.exists() {
        return path
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
    }

    let mut suffix = Vec::new();
    let mut ancestor = path;
    loop {
        match ancestor.parent() {
            Some(parent) => {
                suffix.push(
                    ancestor
                        .file_name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_default(),
                );
                if parent.exists() {
                    let canonical_parent =
                        parent
                            .canonicalize()
                            .map_err(|e| PathValidationError::CanonicalizeFailed {
                                path: parent.display().to_string(),
                                reason: e.to_string(),
                            })?;
                    let mut result = canonical_parent;
                    for part in suffix.into_iter().rev() {
                        result.push(part);
                    }
                    return Ok(result);
                }
                ancestor = parent;
            }
            // Reached the filesystem root without finding an existing ancestor;
            // this can only happen if `vault_root` itself doesn't exist, which
            // is a configuration error the caller should have already rejected.
            None => {
                return Err(PathValidationError::CanonicalizeFailed {
                    path: path.display().to_string(),
                    reason: "no existing ancestor found before filesystem root".into(),
                });
            }
        }
    }
}

fn check_forbidden_components(
    user_path: &str,
    forbidden_dirs: &[&str],
) -> Result<(), PathValidationError> {
    let normalized = user_path.replace('\\', "/");
    for component in normalized.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        for forbidden in forbidden_dirs {
            if component == *forbidden {
                return Err(PathValidationError::ForbiddenComponent {
                    path: user_path.to_string(),
                    component: component.to_string(),
                });
            }
        }
    }
    // §4.2(c): "the first component does not have the forbidden name as prefix"
    if let Some(first) = normalized.split('/').find(|c| !c.is_empty()) {
        for forbidden in forbidden_dirs {
            if first.starts_with(forbidden) {
                return Err(PathValidationError::ForbiddenComponent {
                    path: user_path.to_string(),
                    component: first.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Re-check forbidden components against the fully joined, normalized path —
/// catches cases where `..` segments in `user_path` combine with root
/// components to reintroduce a forbidden name that wasn't visible in the raw
/// string (e.g. `user_path = "sub/../.git/config"`).
fn check_forbidden_components_in_path(
    normalized: &Path,
    vault_root: &Path,
    forbidden_dirs: &[&str],
    original: &str,
) -> Result<(), PathValidationError> {
    let relative = normalized.strip_prefix(vault_root).unwrap_or(normalized);
    for component in relative.components() {
        if let Component::Normal(os) = component
            && let Some(name) = os.to_str()
        {
            for forbidden in forbidden_dirs {
                if name == *forbidden {
                    return Err(PathValidationError::ForbiddenComponent {
                        path: original.to_string(),
                        component: name.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Resolve `.` and `..` components lexically, without touching the
/// filesystem. A leading `..` that would climb above the path's own root is
/// dropped rather than producing a path outside the join — the subsequent
/// `is_descendant_or_equal` check is what actually rejects escapes.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    // Climbed above everything we've accumulated — leave a
                    // marker component so the descendant check below fails
                    // closed instead of silently absorbing the escape.
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_descendant_or_equal(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}
