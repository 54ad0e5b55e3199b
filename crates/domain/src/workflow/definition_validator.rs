//! # ワークフロー定義バリデーション
//!
//! 承認レベルとルーティングルールの構造的整合性を検証する。
//! 定義の作成・更新時に自動実行され、ドライラン用のバリデーション API からも呼び出される。
//!
//! ## 検証ルール
//!
//! | コード | 内容 |
//! |-------|------|
//! | `non_contiguous_level` | レベル番号が 1 から順に連続していない |
//! | `duplicate_level_number` | レベル番号が重複している |
//! | `missing_approver_roles` | 承認ロールが 1 つもないレベル |
//! | `empty_target_levels` | 追加レベルが空のルール |
//! | `unknown_target_level` | 存在しないレベルを参照するルール |
//! | `invalid_operand` | 演算子に対して比較値の型が不正 |
//! | `unsupported_operator` | 未知の演算子（JSON パース時） |
//! | `invalid_rule` | その他のルール構造エラー（JSON パース時） |
//!
//! レベルもルールも空の定義は構造的に有効とする。
//! そのような定義からの開始はエンジンが `NoLevelsDetermined` で拒否する。

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{ApprovalLevel, RoutingRule};
use crate::{DomainError, value_objects::LevelNumber};

/// バリデーション結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid:  bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// 失敗時はエラーメッセージを連結した `DomainError::Validation` に変換する
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.valid {
            return Ok(());
        }
        let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
        Err(DomainError::Validation(messages.join("; ")))
    }
}

/// バリデーションエラー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code:    String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level:   Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule:    Option<usize>,
}

impl ValidationError {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code:    code.into(),
            message: message.into(),
            level:   None,
            rule:    None,
        }
    }

    fn for_level(code: impl Into<String>, message: impl Into<String>, level: u32) -> Self {
        Self {
            level: Some(level),
            ..Self::new(code, message)
        }
    }

    fn for_rule(code: impl Into<String>, message: impl Into<String>, rule: usize) -> Self {
        Self {
            rule: Some(rule),
            ..Self::new(code, message)
        }
    }
}

/// 承認レベルとルーティングルールをバリデーションする
///
/// すべてのルールを順に検証し、エラーを収集して返す。
pub fn validate_definition(levels: &[ApprovalLevel], rules: &[RoutingRule]) -> ValidationResult {
    let mut errors = Vec::new();

    validate_level_numbers(levels, &mut errors);
    validate_approver_roles(levels, &mut errors);
    validate_rule_targets(levels, rules, &mut errors);
    validate_rule_operands(rules, &mut errors);

    ValidationResult::from_errors(errors)
}

/// JSON 形式のルーティングルールをパースし、失敗したルールをエラーとして収集する
///
/// 管理画面からの入力をそのまま検証するドライラン用。
/// パースに成功したルールは構造検証に回される。
pub fn parse_rules(values: &[JsonValue]) -> (Vec<RoutingRule>, Vec<ValidationError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for (index, value) in values.iter().enumerate() {
        match RoutingRule::from_json(value) {
            Ok(rule) => rules.push(rule),
            Err(e @ DomainError::UnsupportedOperator(_)) => {
                errors.push(ValidationError::for_rule("unsupported_operator", e.to_string(), index));
            }
            Err(e) => errors.push(ValidationError::for_rule("invalid_rule", e.to_string(), index)),
        }
    }
    (rules, errors)
}

/// JSON 形式のルールを含めて定義全体を検証する
pub fn validate_definition_input(
    levels: &[ApprovalLevel],
    rules: &[JsonValue],
) -> ValidationResult {
    let (parsed, mut errors) = parse_rules(rules);
    errors.extend(validate_definition(levels, &parsed).errors);
    ValidationResult::from_errors(errors)
}

// --- バリデーションルール ---

/// レベル番号が 1 から順に連続し、重複がないこと
fn validate_level_numbers(levels: &[ApprovalLevel], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (index, level) in levels.iter().enumerate() {
        let number = level.number.as_u32();
        if !seen.insert(number) {
            errors.push(ValidationError::for_level(
                "duplicate_level_number",
                format!("レベル番号 {} が重複しています", number),
                number,
            ));
            continue;
        }
        let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
        if number != expected {
            errors.push(ValidationError::for_level(
                "non_contiguous_level",
                format!(
                    "レベル番号は 1 から順に連続する必要があります（{} 番目が {}）",
                    expected, number
                ),
                number,
            ));
        }
    }
}

/// 各レベルに承認ロールが 1 つ以上あること
fn validate_approver_roles(levels: &[ApprovalLevel], errors: &mut Vec<ValidationError>) {
    for level in levels.iter().filter(|l| l.approver_roles.is_empty()) {
        errors.push(ValidationError::for_level(
            "missing_approver_roles",
            format!("レベル {} に承認ロールがありません", level.number),
            level.number.as_u32(),
        ));
    }
}

/// ルールの追加レベルが空でなく、定義に存在すること
fn validate_rule_targets(
    levels: &[ApprovalLevel],
    rules: &[RoutingRule],
    errors: &mut Vec<ValidationError>,
) {
    let known: HashSet<LevelNumber> = levels.iter().map(|l| l.number).collect();
    for (index, rule) in rules.iter().enumerate() {
        if rule.target_levels().is_empty() {
            errors.push(ValidationError::for_rule(
                "empty_target_levels",
                format!("ルール {} の追加レベルが空です", index),
                index,
            ));
        }
        for target in rule.target_levels().iter().filter(|t| !known.contains(t)) {
            errors.push(ValidationError::for_rule(
                "unknown_target_level",
                format!("ルール {} が存在しないレベル {} を参照しています", index, target),
                index,
            ));
        }
    }
}

/// 演算子と比較値の型が整合していること
fn validate_rule_operands(rules: &[RoutingRule], errors: &mut Vec<ValidationError>) {
    for (index, rule) in rules.iter().enumerate() {
        for (operator, value) in rule.condition().predicates() {
            let valid = if operator.expects_array() {
                value.is_array()
            } else if operator.is_ordering() {
                value.is_number() || value.is_string()
            } else {
                !value.is_null()
            };
            if !valid {
                errors.push(ValidationError::for_rule(
                    "invalid_operand",
                    format!(
                        "ルール {} の演算子 {} に対する比較値が不正です: {}",
                        index, operator, value
                    ),
                    index,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        principal::RoleRef,
        value_objects::LevelName,
        workflow::ApprovalMode,
    };

    fn level(number: u32, roles: &[&str]) -> ApprovalLevel {
        ApprovalLevel {
            number:         LevelNumber::new(number).unwrap(),
            name:           LevelName::new(format!("レベル{}", number)).unwrap(),
            approver_roles: roles.iter().map(|r| RoleRef::new(*r).unwrap()).collect(),
            approval_mode:  ApprovalMode::Any,
            mandatory:      number == 1,
        }
    }

    fn rule(value: JsonValue) -> RoutingRule {
        RoutingRule::from_json(&value).unwrap()
    }

    fn has_error(result: &ValidationResult, code: &str) -> bool {
        result.errors.iter().any(|e| e.code == code)
    }

    #[test]
    fn test_有効な定義はバリデーション成功() {
        let levels = vec![level(1, &["manager"]), level(2, &["director"])];
        let rules = vec![rule(json!({
            "conditionField": "amount", "operator": "gt", "comparisonValue": 10000, "targetLevels": [2]
        }))];

        let result = validate_definition(&levels, &rules);

        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(result.into_result(), Ok(()));
    }

    #[test]
    fn test_レベルもルールもない定義は構造的に有効() {
        let result = validate_definition(&[], &[]);

        assert!(result.valid);
    }

    #[test]
    fn test_レベル番号が連続していない場合エラー() {
        let levels = vec![level(1, &["manager"]), level(3, &["director"])];

        let result = validate_definition(&levels, &[]);

        assert!(has_error(&result, "non_contiguous_level"));
        assert_eq!(result.errors[0].level, Some(3));
    }

    #[test]
    fn test_レベル番号が1から始まらない場合エラー() {
        let result = validate_definition(&[level(2, &["manager"])], &[]);

        assert!(has_error(&result, "non_contiguous_level"));
    }

    #[test]
    fn test_レベル番号が重複している場合エラー() {
        let levels = vec![level(1, &["manager"]), level(1, &["director"])];

        let result = validate_definition(&levels, &[]);

        assert!(has_error(&result, "duplicate_level_number"));
    }

    #[test]
    fn test_承認ロールのないレベルはエラー() {
        let result = validate_definition(&[level(1, &[])], &[]);

        assert!(has_error(&result, "missing_approver_roles"));
    }

    #[test]
    fn test_存在しないレベルを参照するルールはエラー() {
        let rules = vec![rule(json!({"condition": {"amount": {"gt": 1}}, "targetLevels": [5]}))];

        let result = validate_definition(&[level(1, &["manager"])], &rules);

        assert!(has_error(&result, "unknown_target_level"));
        assert_eq!(result.errors[0].rule, Some(0));
    }

    #[test]
    fn test_追加レベルが空のルールはエラー() {
        let rules = vec![rule(json!({"condition": {"amount": {"gt": 1}}, "targetLevels": []}))];

        let result = validate_definition(&[level(1, &["manager"])], &rules);

        assert!(has_error(&result, "empty_target_levels"));
    }

    #[test]
    fn test_inの比較値が配列でない場合エラー() {
        let rules = vec![rule(json!({"condition": {"tier": {"in": "A"}}, "targetLevels": [1]}))];

        let result = validate_definition(&[level(1, &["manager"])], &rules);

        assert!(has_error(&result, "invalid_operand"));
    }

    #[test]
    fn test_大小比較の比較値が真偽値の場合エラー() {
        let rules = vec![rule(json!({"condition": {"amount": {"gte": true}}, "targetLevels": [1]}))];

        let result = validate_definition(&[level(1, &["manager"])], &rules);

        assert!(has_error(&result, "invalid_operand"));
    }

    #[test]
    fn test_未知の演算子はunsupported_operatorとして報告される() {
        let levels = vec![level(1, &["manager"])];
        let rules = vec![
            json!({"conditionField": "amount", "operator": "between", "comparisonValue": [1, 2], "targetLevels": [1]}),
            json!({"conditionField": "amount", "operator": "gt", "comparisonValue": 1, "targetLevels": [9]}),
        ];

        let result = validate_definition_input(&levels, &rules);

        assert!(!result.valid);
        let codes: BTreeSet<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, BTreeSet::from(["unknown_target_level", "unsupported_operator"]));
    }

    #[test]
    fn test_構造が不正なルールはinvalid_ruleとして報告される() {
        let (rules, errors) = parse_rules(&[json!({"targetLevels": [1]})]);

        assert!(rules.is_empty());
        assert_eq!(errors[0].code, "invalid_rule");
    }

    #[test]
    fn test_失敗時はバリデーションエラーに変換される() {
        let result = validate_definition(&[level(2, &[])], &[]);

        assert!(matches!(result.into_result(), Err(DomainError::Validation(_))));
    }
}
