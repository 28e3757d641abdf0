pub mod coinapi;
pub mod coingecko;
pub mod util;

pub use coinapi::CoinApiProvider;
pub use coingecko::CoinGeckoProvider;
