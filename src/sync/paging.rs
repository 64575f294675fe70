//! Page arithmetic and the clock used for unattended page selection.

use chrono::{DateTime, Utc};
use std::ops::Range;
use std::time::Duration;

/// `ceil(items / page_size)`; a zero page size counts as one.
pub fn total_pages(items: usize, page_size: usize) -> usize {
	items.div_ceil(page_size.max(1))
}

/// Index range of `page` within a list of `len` items. Past the end it is empty.
pub fn page_window(page: usize, page_size: usize, len: usize) -> Range<usize> {
	let page_size = page_size.max(1);
	let start = page.saturating_mul(page_size).min(len);
	let end = start.saturating_add(page_size).min(len);
	start..end
}

/// Whether `page` is the last one a caller needs to request.
pub fn is_last_page(page: usize, total_pages: usize) -> bool {
	page.saturating_add(1) >= total_pages
}

/// Round-robin page for cron-style invocations: `floor(now / interval) mod total_pages`.
pub fn page_for_timestamp(now: DateTime<Utc>, interval: Duration, total_pages: usize) -> usize {
	if total_pages == 0 {
		return 0;
	}
	let interval_secs = interval.as_secs().max(1);
	let slot = now.timestamp().max(0) as u64 / interval_secs;
	(slot % total_pages as u64) as usize
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		self.0
	}
}
