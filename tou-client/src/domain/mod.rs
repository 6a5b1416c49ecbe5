mod category;
mod subscriber;
mod tou_record;

pub use category::{Category, ParseCategoryError};
pub use subscriber::{NotificationMethod, NotificationRecipient, SubscriberProfile};
pub use tou_record::{RateLevel, TouRecord};
