//! Static table of supported coins and their provider identifiers.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Coin {
    pub symbol: &'static str,
    pub name: &'static str,
    /// Identifier used by CoinGecko and as the cache key.
    pub coingecko_id: &'static str,
}

const fn coin(symbol: &'static str, name: &'static str, coingecko_id: &'static str) -> Coin {
    Coin {
        symbol,
        name,
        coingecko_id,
    }
}

/// Top coins by market cap with good historical data.
pub static SUPPORTED_COINS: &[Coin] = &[
    coin("BTC", "Bitcoin", "bitcoin"),
    coin("ETH", "Ethereum", "ethereum"),
    coin("USDT", "Tether", "tether"),
    coin("BNB", "BNB", "binancecoin"),
    coin("SOL", "Solana", "solana"),
    coin("XRP", "XRP", "ripple"),
    coin("ADA", "Cardano", "cardano"),
    coin("DOGE", "Dogecoin", "dogecoin"),
    coin("AVAX", "Avalanche", "avalanche-2"),
    coin("DOT", "Polkadot", "polkadot"),
    coin("MATIC", "Polygon", "matic-network"),
    coin("LTC", "Litecoin", "litecoin"),
    coin("TRX", "TRON", "tron"),
    coin("BCH", "Bitcoin Cash", "bitcoin-cash"),
    coin("LINK", "Chainlink", "chainlink"),
    coin("XLM", "Stellar", "stellar"),
    coin("ATOM", "Cosmos", "cosmos"),
    coin("FIL", "Filecoin", "filecoin"),
    coin("UNI", "Uniswap", "uniswap"),
    coin("ICP", "Internet Computer", "internet-computer"),
    coin("ETC", "Ethereum Classic", "ethereum-classic"),
];

/// Finds a coin by ticker symbol, ignoring case.
pub fn lookup(symbol: &str) -> Option<&'static Coin> {
    let symbol = symbol.trim().to_uppercase();
    SUPPORTED_COINS.iter().find(|c| c.symbol == symbol)
}

/// Splits `symbols` into known coins (in input order, deduplicated) and unknown symbols.
pub fn resolve(symbols: &[String]) -> (Vec<&'static Coin>, Vec<String>) {
    let mut known: Vec<&'static Coin> = Vec::new();
    let mut unknown = Vec::new();
    for symbol in symbols {
        match lookup(symbol) {
            Some(coin) => {
                if !known.iter().any(|c| c.symbol == coin.symbol) {
                    known.push(coin);
                }
            }
            None => {
                if !unknown.contains(symbol) {
                    unknown.push(symbol.clone());
                }
            }
        }
    }
    (known, unknown)
}
