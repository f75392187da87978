pub mod assessment;
pub mod manager;
pub mod role_change;
pub mod sales;
pub mod tier;
