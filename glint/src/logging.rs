// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostic log threshold from the environment.
//!
//! `GLINT_LOG` holds a single digit `0`–`9` mapped onto the five-level
//! taxonomy: `0`/`1` debug, `2`/`3` info, `4`/`5` warning, `6`/`7` error,
//! `8`/`9` silent. Binaries feed the result to their logger; absence or a
//! malformed value means "leave the logger's default alone".

use log::LevelFilter;

pub const LOG_ENV: &str = "GLINT_LOG";

/// The level filter requested via [`LOG_ENV`], if any.
pub fn level_from_env() -> Option<LevelFilter> {
    let value = std::env::var(LOG_ENV).ok()?;
    let digit = value.bytes().next().filter(u8::is_ascii_digit)?;
    Some(match digit {
        b'0' | b'1' => LevelFilter::Debug,
        b'2' | b'3' => LevelFilter::Info,
        b'4' | b'5' => LevelFilter::Warn,
        b'6' | b'7' => LevelFilter::Error,
        _ => LevelFilter::Off,
    })
}
