pub mod coins;
pub mod optimize;
pub mod prices;
pub mod quality;
pub mod setup;
pub mod ui;
