//! Shared UI icons, with plain-text fallbacks for terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Run indicators
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static PIVOT: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static SPLIT: Emoji<'_, '_> = Emoji("🔀 ", "[SPLIT]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static WAITING: Emoji<'_, '_> = Emoji("⏳ ", "[..]");
