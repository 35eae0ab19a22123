//! Money: position sizing, trade settlement, rollover, margin and risk.

use crate::domain::{AssetParams, Side, Trade, TradeRecord};

/// Inputs to position sizing; zero fields are inactive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeRequest {
    pub lots: u32,
    pub margin: f64,
    pub risk: f64,
    /// Unsigned stop distance in price units.
    pub stop: f64,
}

/// Number of lots to trade. 0 means the entry is rejected.
pub fn size_lots(req: &SizeRequest, asset: &AssetParams) -> u32 {
    let mut lots = req.lots as f64;
    if req.margin > 0.0 && asset.margin_cost > 0.0 {
        lots = (req.margin / asset.margin_cost).floor();
    }
    if req.risk > 0.0 && req.stop > 0.0 {
        let per_lot = asset.value_of(req.stop, 1.0);
        if per_lot > 0.0 {
            lots = lots.min((req.risk / per_lot).floor());
        }
    }
    if asset.max_lots > 0 {
        lots = lots.min(asset.max_lots as f64);
    }
    lots.max(0.0) as u32
}

/// Rollover for one bar of `bar_period` minutes.
pub fn rollover_per_bar(trade: &Trade, asset: &AssetParams, bar_period: f64) -> f64 {
    let rate = match trade.side {
        Side::Long => asset.roll_long,
        Side::Short => asset.roll_short,
    };
    trade.lots as f64 * rate * bar_period / 1440.0
}

/// Open result at exit price `exit`, including rollover.
pub fn unrealized(trade: &Trade, asset: &AssetParams, exit: f64) -> f64 {
    asset.value_of(trade.gain(exit), trade.lots as f64) + trade.roll
}

pub fn margin_of(trade: &Trade, asset: &AssetParams) -> f64 {
    asset.margin_cost * trade.lots as f64
}

/// Loss if the trade were stopped now; without a stop, its margin.
pub fn risk_of(trade: &Trade, asset: &AssetParams) -> f64 {
    if trade.stop_limit > 0.0 {
        (-asset.value_of(trade.gain(trade.stop_limit), trade.lots as f64)).max(0.0)
    } else {
        margin_of(trade, asset)
    }
}

/// Slippage cost of a fill in account currency; positive is adverse.
pub fn slippage_cost(asset: &AssetParams, ideal: f64, actual: f64, buy: bool, lots: u32) -> f64 {
    let adverse = if buy { actual - ideal } else { ideal - actual };
    asset.value_of(adverse, lots as f64)
}

/// Finalize the result of a closed trade and build its log record.
/// `None` for trades that never filled.
pub fn settle(trade: &mut Trade, asset: &AssetParams) -> Option<TradeRecord> {
    let id = trade.id?;
    let reason = trade.close_reason()?;
    let lots = trade.lots as f64;
    let distance = trade.gain(trade.exit_price);
    let gross = asset.value_of(distance, lots);
    trade.commission = asset.commission * lots;
    trade.result = gross + trade.roll - trade.commission;
    Some(TradeRecord {
        id,
        algo: trade.status.algo.clone(),
        asset: asset.name.clone(),
        side: trade.side,
        reason,
        flags: trade.flags(),
        phantom: trade.attrs.phantom,
        bar_open: trade.bar_open,
        bar_close: trade.bar_close,
        time_open: trade.time_open,
        time_close: trade.time_close,
        entry_price: trade.entry_price,
        exit_price: trade.exit_price,
        lots: trade.lots,
        gross,
        pips: distance / asset.pip,
        commission: trade.commission,
        rollover: trade.roll,
        slippage: trade.slippage,
        spread_cost: asset.value_of(trade.spread, lots),
        result: trade.result,
        mae: trade.mae,
        mfe: trade.mfe,
    })
}
