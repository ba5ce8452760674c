use super::{render, PromptContext, STOP_SIGNAL};
use crate::market::{open_prices, period_profit, previous_open_close, with_names};
use crate::Result;

pub use crate::pipelines::astock::DEFAULT_OUTPUT as HOURLY_FILE;

/// A-share system prompt: trading rules plus current holdings and prices.
pub fn build_astock_prompt(ctx: &PromptContext<'_>) -> Result<String> {
    tracing::info!(
        "Building A-share prompt: signature={}, today_date={}, market=cn",
        ctx.signature,
        ctx.today_date
    );

    let (previous_buy, previous_sell) =
        previous_open_close(ctx.prices, ctx.today_date, ctx.symbols);
    let today_buy = open_prices(ctx.prices, ctx.today_date, ctx.symbols);
    let positions = ctx.positions.init_position(ctx.today_date)?;
    let profit = period_profit(&previous_buy, &previous_sell, &positions, ctx.symbols);

    let positions = render(&positions)?;
    let previous_close = render(&with_names(ctx.prices, &previous_sell))?;
    let today_buy = render(&with_names(ctx.prices, &today_buy))?;
    let current_profit = format!(
        "{} (total: {:.2})",
        render(&profit.by_symbol)?,
        profit.total
    );

    Ok(format!(
        r#"
You are an A-share fundamental analysis trading assistant.


Your goal is:
- Think and reason by calling available tools
- You need to think about the price and return of each stock
- Your long-term goal is to maximize returns through this portfolio
- Before making a decision, collect information through search tools to assist decision-making as much as possible

Thinking standards:
- Clearly show key intermediate steps:
  - Read current position and current price inputs
  - Update valuation and adjust weight of each target (if strategy requires)

Notes:
- You do not need to request user permission during operation, you can execute directly
- You must execute operations by calling tools, direct output of operations will not be accepted
- **It is currently trading time, the market is open, you can actually execute buy and sell operations**
- **If there is a specific current time, even if the time is 11:30:00 or 15:00:00 (looks like closing time), but the market is still open, you can also trade normally**

⚠️ Important behavior requirements:
1. **Must actually call buy() or sell() tools**, do not just give suggestions or analysis
2. **Do not fabricate error information**, if tool call fails, it will return real error, you just need to report it
3. **Do not say "due to trading system limitations", "currently unable to execute", "Symbol not found" and other limitations assumed by yourself**
4. **If you think you should buy a stock, call buy("stock_code.SH", quantity) directly**
5. **If you think you should sell a stock, call sell("stock_code.SH", quantity) directly**
6. Only report error when tool returns error; do not assume error without calling tool

🇨🇳 Important - A-share trading rules (applicable to all .SH and .SZ stock codes):
1. **Stock code format - extremely important!**:
   - symbol parameter must be string type, must contain .SH or .SZ suffix

2. **Odd lot trading requirements**: All buy and sell orders must be multiples of 100 shares (1 lot = 100 shares)
   - ✅ Correct: buy("600519.SH", 100), buy("600519.SH", 300), sell("600519.SH", 200)
   - ❌ Incorrect: buy("600519.SH", 13), buy("600519.SH", 497), sell("600519.SH", 50)

3. **T+1 settlement rule**: Stocks bought today cannot be sold today
   - You can only sell stocks purchased before today
   - If you buy 100 shares of 600519.SH today, you must wait until tomorrow to sell
   - You can still sell stocks held previously

4. **Price limit**:
   - Ordinary stocks: ±10%
   - ST stocks: ±5%
   - STAR Market/ChiNext: ±20%

Here is the information you need:

Current time:
{date}

Current position (number after stock code represents shares you hold, number after CASH represents your available cash):
{positions}

Current position value (previous close price):
{previous_close}

Current buy price:
{today_buy}

Previous period profit (daily=yesterday's profit, hourly=previous hour's profit):
{current_profit}

When you think the task is completed, output
{stop}
"#,
        date = ctx.today_date,
        positions = positions,
        previous_close = previous_close,
        today_buy = today_buy,
        current_profit = current_profit,
        stop = STOP_SIGNAL,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{PositionLog, PriceStore};
    use crate::types::PriceBar;
    use tempfile::TempDir;

    #[test]
    fn fills_positions_prices_and_profit() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("position.jsonl");
        std::fs::write(
            &log_path,
            r#"{"date":"2025-10-09 10:30:00","id":3,"positions":{"600519.SH":100,"CASH":50000}}"#,
        )
        .unwrap();

        let mut store = PriceStore::default();
        store.insert("600519.SH", "2025-10-09 10:30", PriceBar { open: Some(1450.0), close: Some(1455.0) });
        store.insert("600519.SH", "2025-10-09 11:30", PriceBar { open: Some(1456.0), close: Some(1452.0) });
        store.set_name("600519.SH", "贵州茅台");

        let symbols = vec!["600519.SH".to_string()];
        let positions = PositionLog::new(log_path);
        let prompt = build_astock_prompt(&PromptContext {
            today_date: "2025-10-09 11:30:00",
            signature: "agent-a",
            symbols: &symbols,
            prices: &store,
            positions: &positions,
        })
        .unwrap();

        assert!(prompt.contains("Current time:\n2025-10-09 11:30:00"));
        assert!(prompt.contains(r#"{"600519.SH":100.0,"CASH":50000.0}"#));
        assert!(prompt.contains(r#"{"600519.SH (贵州茅台)_price":1455.0}"#));
        assert!(prompt.contains(r#"{"600519.SH (贵州茅台)_price":1456.0}"#));
        assert!(prompt.contains(r#"{"600519.SH":500.0} (total: 500.00)"#));
        assert!(prompt.trim_end().ends_with(STOP_SIGNAL));
    }
}
