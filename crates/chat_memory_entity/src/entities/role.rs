use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 消息角色，数据库中以小写字符串保存
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "system")]
    System,
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "assistant")]
    Assistant,
}

#[cfg(test)]
mod tests {
    use sea_orm::ActiveEnum;

    use crate::Role;

    #[test]
    fn test_role_is_exported_at_crate_root() {
        assert_eq!(Role::Assistant.to_value(), "assistant");
        assert_eq!(Role::System.to_value(), "system");
        assert_eq!(Role::User.to_string(), "user");
    }
}
