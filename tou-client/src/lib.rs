pub mod db;
pub mod domain;

pub use domain::{
    Category, NotificationMethod, NotificationRecipient, RateLevel, SubscriberProfile, TouRecord,
};
