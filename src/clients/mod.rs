pub mod alpha_vantage;
pub mod eastmoney;

pub use alpha_vantage::{AlphaVantageClient, FxDailyResponse, FxSource, OutputSize};
pub use eastmoney::{EastmoneyClient, Exchange, KlineSource};
