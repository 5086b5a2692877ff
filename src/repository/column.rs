// ==========================================
// 烘焙运营管理系统 - 数值列类型检查
// ==========================================
// 说明: SQLite 列亲和性不阻止 REAL/INTEGER 列存入文本
// 数值列一律先读成 Value，再在此转换；坏值变成字段错误，不会中断整条查询
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Value;

/// 读取 REAL 列（整数值按浮点接受）
///
/// # 参数
/// - field: 表名.列名
/// - row: 行标识，例如 "recipe_id=R1"
pub(crate) fn real(field: &str, row: &str, value: &Value) -> RepositoryResult<f64> {
    match value {
        Value::Real(v) => Ok(*v),
        Value::Integer(v) => Ok(*v as f64),
        other => Err(type_error(field, row, "REAL", other)),
    }
}

/// 读取 INTEGER 列
pub(crate) fn integer(field: &str, row: &str, value: &Value) -> RepositoryResult<i64> {
    match value {
        Value::Integer(v) => Ok(*v),
        other => Err(type_error(field, row, "INTEGER", other)),
    }
}

/// 读取 TEXT 列
pub(crate) fn text(field: &str, row: &str, value: Value) -> RepositoryResult<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(type_error(field, row, "TEXT", &other)),
    }
}

fn type_error(field: &str, row: &str, expected: &str, value: &Value) -> RepositoryError {
    RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("{}: 期望 {}，实际为 {}", row, expected, describe(value)),
    }
}

/// 日志与隔离原因中的值描述
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => format!("INTEGER {}", v),
        Value::Real(v) => format!("REAL {}", v),
        Value::Text(s) => format!("TEXT {:?}", s),
        Value::Blob(b) => format!("BLOB ({} 字节)", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_accepts_numeric_storage_classes() {
        assert_eq!(real("recipe.dough_weight_g", "recipe_id=R1", &Value::Real(900.0)).unwrap(), 900.0);
        assert_eq!(real("recipe.dough_weight_g", "recipe_id=R1", &Value::Integer(900)).unwrap(), 900.0);
    }

    #[test]
    fn test_text_in_numeric_column_is_field_error() {
        let err = real("recipe.dough_weight_g", "recipe_id=R_BAD", &Value::Text("n/a".to_string()))
            .unwrap_err();
        match err {
            RepositoryError::FieldValueError { field, message } => {
                assert_eq!(field, "recipe.dough_weight_g");
                assert!(message.contains("R_BAD"));
                assert!(message.contains("n/a"));
            }
            other => panic!("expected field error, got {:?}", other),
        }

        assert!(integer("bake_event_recipe.quantity", "entry_id=E1-1", &Value::Real(1.5)).is_err());
        assert!(integer("bake_event_recipe.quantity", "entry_id=E1-1", &Value::Null).is_err());
        assert!(text("bake_event.event_date", "event_id=E1", Value::Integer(20260301)).is_err());
    }
}
