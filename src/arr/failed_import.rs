use super::QueueRecord;
use crate::context::ExecutionContext;
use crate::strikes::{StrikeTracker, StrikeType};

const FAILED_IMPORT_STATES: [&str; 3] = ["importPending", "importFailed", "importBlocked"];

/// The arr finished the download but could not import it.
pub fn is_failed_import(record: &QueueRecord) -> bool {
    record.tracked_download_status.eq_ignore_ascii_case("warning")
        && FAILED_IMPORT_STATES
            .iter()
            .any(|state| record.tracked_download_state.eq_ignore_ascii_case(state))
}

fn matches_ignored_pattern(record: &QueueRecord, patterns: &[String]) -> bool {
    let patterns: Vec<String> = patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return false;
    }

    record
        .status_messages
        .iter()
        .flat_map(|status| std::iter::once(&status.title).chain(status.messages.iter()))
        .map(|text| text.to_lowercase())
        .any(|text| patterns.iter().any(|p| text.contains(p.as_str())))
}

/// Strikes a failed import and reports whether the item reached its limit.
pub fn should_remove_for_failed_import(
    ctx: &ExecutionContext<'_>,
    record: &QueueRecord,
    is_private: bool,
    strikes: &StrikeTracker,
) -> bool {
    let settings = &ctx.config.queue_cleaner.failed_import;
    let max_strikes = ctx.config.failed_import_max_strikes(ctx.instance_type);
    if max_strikes == 0 || !is_failed_import(record) {
        return false;
    }

    if is_private && settings.ignore_private {
        tracing::debug!("Skipping failed import check for private item: {}", record.title);
        return false;
    }

    if matches_ignored_pattern(record, &settings.ignored_patterns) {
        tracing::info!("Failed import matches an ignored pattern: {}", record.title);
        return false;
    }

    strikes.strike_and_check_limit(
        ctx,
        &record.download_id,
        &record.title,
        max_strikes,
        StrikeType::ImportFailed,
    )
}
