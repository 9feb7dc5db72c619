pub mod bgg;
pub mod cache;
pub mod core;
pub mod db;
pub mod gallery;
pub mod rating;
pub mod render;

use serde_derive::{Deserialize, Serialize};

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub owner: Member, // informational, arbitrary after merge
    pub rating: Option<f64>,
    pub min_players: Option<u32>,
    pub max_players: Option<u32>
}

impl Game {
    pub fn url(&self) -> String {
        format!("https://boardgamegeek.com/boardgame/{}", self.id)
    }

    /// Player range as shown under a card, e.g. `(2 - 4 players)`.
    pub fn players_label(&self) -> String {
        format!("({} - {} players)", or_na(self.min_players), or_na(self.max_players))
    }
}

fn or_na(n: Option<u32>) -> String {
    match n {
        Some(n) => n.to_string(),
        None => String::from(NOT_AVAILABLE)
    }
}

pub type Member = String; // member name
