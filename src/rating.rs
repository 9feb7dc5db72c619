use crate::NOT_AVAILABLE;

/// Badge colors for average ratings.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Shade {
    Missing,
    Dismal,    // 1-2
    Poor,      // 3-4
    Mediocre,  // 5-6
    Decent,    // 7
    Good,      // 8
    Excellent  // 9-10
}

impl Shade {
    pub fn hex(self) -> &'static str {
        match self {
            Shade::Missing => "#808080",
            Shade::Dismal => "#b2151f",
            Shade::Poor => "#d71925",
            Shade::Mediocre => "#5369a2",
            Shade::Decent => "#1978b3",
            Shade::Good => "#1d804c",
            Shade::Excellent => "#186b40"
        }
    }

    pub fn rgb(self) -> (u8, u8, u8) {
        let hex = &self.hex()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0x80);
        (channel(0), channel(2), channel(4))
    }
}

/// Rounds to the nearest integer (ties to even) and picks the badge color.
/// Anything outside 1..=10 shares the color of a missing rating.
pub fn shade(rating: Option<f64>) -> Shade {
    let rating = match rating {
        Some(r) if r.is_finite() => r.round_ties_even(),
        _ => return Shade::Missing
    };
    match rating as i64 {
        1 | 2 => Shade::Dismal,
        3 | 4 => Shade::Poor,
        5 | 6 => Shade::Mediocre,
        7 => Shade::Decent,
        8 => Shade::Good,
        9 | 10 => Shade::Excellent,
        _ => Shade::Missing
    }
}

/// Badge text: one decimal or `N/A`.
pub fn label(rating: Option<f64>) -> String {
    match rating {
        Some(r) if r.is_finite() => format!("{:.1}", r),
        _ => String::from(NOT_AVAILABLE)
    }
}
