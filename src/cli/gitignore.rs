//! Keep the state database out of version control.
//!
//! Entries live in a marker-delimited block so re-running `init` rewrites
//! the block instead of appending duplicates.

use std::path::Path;

use crate::config::STATE_DIR;
use crate::error::Error;

const BLOCK_START: &str = "# >>> docwatch state";
const BLOCK_END: &str = "# <<< docwatch state";

fn managed_block() -> String {
    format!(
        "{start}\n/{dir}/*.db\n/{dir}/*.db-*\n{end}",
        start = BLOCK_START,
        dir = STATE_DIR,
        end = BLOCK_END
    )
}

/// Write the managed block into `<repo>/.gitignore`.
///
/// Returns false when the file already had an up-to-date block.
pub fn ensure_ignored(repo_root: &Path) -> Result<bool, Error> {
    let path = repo_root.join(".gitignore");
    let content = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let block = managed_block();
    let updated = match (content.find(BLOCK_START), content.find(BLOCK_END)) {
        (Some(start), Some(end)) if start < end => {
            let end = end + BLOCK_END.len();
            if content[start..end] == block {
                return Ok(false);
            }
            format!("{}{}{}", &content[..start], block, &content[end..])
        }
        (Some(_), Some(_)) => return Err(Error::other(".gitignore markers are out of order")),
        _ if content.trim().is_empty() => format!("{}\n", block),
        _ => format!("{}\n\n{}\n", content.trim_end(), block),
    };

    std::fs::write(&path, updated)?;
    Ok(true)
}
