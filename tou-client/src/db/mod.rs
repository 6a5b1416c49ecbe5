pub mod subscriber_queries;
pub mod tou_rate_queries;
