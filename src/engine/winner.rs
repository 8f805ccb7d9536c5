//! Winning-ticket selection over a sold-ticket snapshot.

use crate::domain::{SoldTicket, TimeMs};
use rand::Rng;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnerPolicy<'a> {
    /// Uniform over the snapshot.
    Random,
    /// `draw_number mod len(snapshot)`.
    Lottery { draw_number: &'a str },
    Manual { ticket_number: u32 },
}

/// Where the winning index came from. Persisted with the raffle for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    Rng,
    DrawNumber(String),
    /// The configured draw number was not numeric.
    WallClock(i64),
    Manual(u32),
}

impl SeedSource {
    pub fn is_wall_clock(&self) -> bool {
        matches!(self, SeedSource::WallClock(_))
    }
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSource::Rng => write!(f, "random"),
            SeedSource::DrawNumber(d) => write!(f, "lottery:{}", d),
            SeedSource::WallClock(ms) => write!(f, "wall-clock:{}", ms),
            SeedSource::Manual(n) => write!(f, "manual:{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub index: usize,
    pub seed: SeedSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WinnerError {
    #[error("no sold tickets to draw from")]
    NoSoldTickets,
    #[error("ticket {0} was not sold")]
    TicketNotFound(u32),
}

/// `digits mod modulus` for an arbitrarily long decimal string.
///
/// Returns None if `digits` is empty or contains a non-digit.
fn decimal_string_mod(digits: &str, modulus: u64) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0u64, |acc, c| {
        let d = u64::from(c.to_digit(10)?);
        Some((acc * 10 + d) % modulus)
    })
}

/// Pick the winning index into `sold` (insertion order) under `policy`.
pub fn draw<R: Rng + ?Sized>(
    sold: &[SoldTicket],
    policy: &WinnerPolicy<'_>,
    rng: &mut R,
    now: TimeMs,
) -> Result<Draw, WinnerError> {
    if sold.is_empty() {
        return Err(WinnerError::NoSoldTickets);
    }
    let len = sold.len();

    match policy {
        WinnerPolicy::Random => Ok(Draw {
            index: rng.random_range(0..len),
            seed: SeedSource::Rng,
        }),
        WinnerPolicy::Lottery { draw_number } => {
            let draw_number = draw_number.trim();
            match decimal_string_mod(draw_number, len as u64) {
                Some(idx) => Ok(Draw {
                    index: idx as usize,
                    seed: SeedSource::DrawNumber(draw_number.to_string()),
                }),
                None => {
                    let ms = now.as_ms();
                    Ok(Draw {
                        index: ms.rem_euclid(len as i64) as usize,
                        seed: SeedSource::WallClock(ms),
                    })
                }
            }
        }
        WinnerPolicy::Manual { ticket_number } => sold
            .iter()
            .position(|t| t.number == *ticket_number)
            .map(|index| Draw {
                index,
                seed: SeedSource::Manual(*ticket_number),
            })
            .ok_or(WinnerError::TicketNotFound(*ticket_number)),
    }
}
