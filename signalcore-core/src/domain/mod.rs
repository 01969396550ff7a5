//! Domain types shared by the simulator, the sweep driver and the signal lifecycle.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod order;
pub mod params;
pub mod position;
pub mod selection;
pub mod tick;
pub mod trade_signal;

pub use bar::Bar;
pub use fill::Fill;
pub use ids::{AccountId, OrderId, PositionKey};
pub use order::{
    Order, OrderParams, OrderSide, OrderStatus, OrderType, ProtectiveKind, TimeInForce,
};
pub use params::{
    apply_parameters, ParamError, ParamSet, ParamValue, PriceSeries, ScriptingParameter,
    SweepRange,
};
pub use position::Position;
pub use selection::{Selection, SelectionRange, Timeframe};
pub use tick::Tick;
pub use trade_signal::TradeSignal;
