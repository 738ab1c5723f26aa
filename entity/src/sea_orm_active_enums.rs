//! `SeaORM` Entity, shared active enums for the mail intelligence schema.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "processing_type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingType {
    #[sea_orm(string_value = "DATE_RANGE")]
    DateRange,
    #[sea_orm(string_value = "RECURRING")]
    Recurring,
    #[sea_orm(string_value = "SPECIFIC_DATES")]
    SpecificDates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "llm_focus")]
#[serde(rename_all = "snake_case")]
pub enum LlmFocus {
    #[sea_orm(string_value = "general")]
    General,
    #[sea_orm(string_value = "sentiment")]
    Sentiment,
    #[sea_orm(string_value = "urgency")]
    Urgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "priority")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[sea_orm(string_value = "LOW")]
    #[default]
    Low,
    #[sea_orm(string_value = "MEDIUM")]
    Medium,
    #[sea_orm(string_value = "HIGH")]
    High,
    #[sea_orm(string_value = "URGENT")]
    Urgent,
}

impl Priority {
    /// The post-LLM importance-score boost this priority contributes, per spec §4.6.
    pub fn score_boost(self) -> i32 {
        match self {
            Priority::Urgent => 30,
            Priority::High => 20,
            Priority::Medium => 10,
            Priority::Low => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "sentiment")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    #[sea_orm(string_value = "POSITIVE")]
    Positive,
    #[default]
    #[sea_orm(string_value = "NEUTRAL")]
    Neutral,
    #[sea_orm(string_value = "NEGATIVE")]
    Negative,
    #[sea_orm(string_value = "MIXED")]
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "category")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    #[sea_orm(string_value = "WORK")]
    Work,
    #[default]
    #[sea_orm(string_value = "PERSONAL")]
    Personal,
    #[sea_orm(string_value = "MARKETING")]
    Marketing,
    #[sea_orm(string_value = "NEWSLETTER")]
    Newsletter,
    #[sea_orm(string_value = "SUPPORT")]
    Support,
    #[sea_orm(string_value = "NOTIFICATION")]
    Notification,
    #[sea_orm(string_value = "INVOICE")]
    Invoice,
    #[sea_orm(string_value = "RECEIPT")]
    Receipt,
    #[sea_orm(string_value = "APPOINTMENT")]
    Appointment,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Work,
        Category::Personal,
        Category::Marketing,
        Category::Newsletter,
        Category::Support,
        Category::Notification,
        Category::Invoice,
        Category::Receipt,
        Category::Appointment,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "processing_status")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "execution_status")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[sea_orm(string_value = "RUNNING")]
    Running,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entity_type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    #[sea_orm(string_value = "PERSON")]
    Person,
    #[sea_orm(string_value = "ORGANIZATION")]
    Organization,
    #[sea_orm(string_value = "DATE")]
    Date,
    #[sea_orm(string_value = "AMOUNT")]
    Amount,
    #[sea_orm(string_value = "LOCATION")]
    Location,
    #[sea_orm(string_value = "PHONE_NUMBER")]
    PhoneNumber,
    #[sea_orm(string_value = "URL")]
    Url,
    #[sea_orm(string_value = "ORDER_NUMBER")]
    OrderNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "action_type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    #[sea_orm(string_value = "REPLY")]
    Reply,
    #[sea_orm(string_value = "SCHEDULE")]
    Schedule,
    #[sea_orm(string_value = "PAY")]
    Pay,
    #[sea_orm(string_value = "REVIEW")]
    Review,
    #[sea_orm(string_value = "FOLLOW_UP")]
    FollowUp,
    #[sea_orm(string_value = "OTHER")]
    Other,
}
