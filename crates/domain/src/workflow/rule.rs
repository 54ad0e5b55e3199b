//! # ルーティングルール
//!
//! ドキュメントコンテキストに対する条件と、条件成立時に追加される承認レベルを定義する。
//!
//! ## ワイヤ表現
//!
//! 永続化・API では次の 2 形式を受け付け、オブジェクト形式で出力する。
//!
//! ```json
//! // フラット形式（1 演算子）
//! {"conditionField": "amount", "operator": "gt", "comparisonValue": 10000, "targetLevels": [2]}
//!
//! // オブジェクト形式（同一フィールドの演算子は AND）
//! {"condition": {"amount": {"gte": 10000, "lt": 500000}}, "targetLevels": [2]}
//! ```
//!
//! オブジェクト形式で演算子オブジェクトの代わりにスカラー値を書いた場合は `eq` とみなす。
//!
//! ## 評価の原則
//!
//! [`evaluate`] は副作用を持たない全域関数で、判定不能なケースはすべて不成立（fail closed）:
//!
//! - コンテキストにフィールドが存在しない、または `null`
//! - 大小比較で数値・文字列として比較できない型の組み合わせ
//! - `in` / `not_in` の比較値が配列でない
//! - 演算子が 1 つも指定されていない
//!
//! 未知の演算子トークンはパース時に拒否するため、評価時には存在しない。

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use strum::IntoStaticStr;

use crate::{DomainError, document::DocumentContext, value_objects::LevelNumber};

/// 条件演算子
///
/// ワイヤ表現は `gt gte lt lte eq ne in not_in`。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    In,
    NotIn,
}

impl RuleOperator {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// 比較値に配列を要求する演算子か
    pub fn expects_array(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// 大小比較を行う演算子か
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// 実値と比較値に対して演算子が成立するか判定する
    fn holds(&self, actual: &JsonValue, expected: &JsonValue) -> bool {
        match self {
            Self::Gt => compare(actual, expected) == Some(Ordering::Greater),
            Self::Gte => matches!(
                compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt => compare(actual, expected) == Some(Ordering::Less),
            Self::Lte => matches!(
                compare(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Eq => values_equal(actual, expected),
            Self::Ne => !values_equal(actual, expected),
            Self::In => expected
                .as_array()
                .is_some_and(|candidates| contains_any(actual, candidates)),
            Self::NotIn => expected
                .as_array()
                .is_some_and(|candidates| !contains_any(actual, candidates)),
        }
    }
}

impl std::str::FromStr for RuleOperator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            _ => Err(DomainError::UnsupportedOperator(s.to_string())),
        }
    }
}

/// 数値または数値文字列を f64 に変換する
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// 大小比較
///
/// 双方が数値として解釈できれば数値比較、双方が文字列なら辞書順比較。
/// それ以外は比較不能（`None`）。
fn compare(actual: &JsonValue, expected: &JsonValue) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// 等値比較（数値は型をまたいで比較する）
fn values_equal(actual: &JsonValue, expected: &JsonValue) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

/// 実値（配列なら各要素）のいずれかが候補に含まれるか
fn contains_any(actual: &JsonValue, candidates: &[JsonValue]) -> bool {
    match actual {
        JsonValue::Array(items) => items
            .iter()
            .any(|item| candidates.iter().any(|c| values_equal(item, c))),
        single => candidates.iter().any(|c| values_equal(single, c)),
    }
}

/// ルール条件
///
/// 1 つのフィールドに対する演算子の集合。すべての演算子が成立したとき条件成立（AND）。
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCondition {
    field:      String,
    predicates: BTreeMap<RuleOperator, JsonValue>,
}

impl RuleCondition {
    /// 条件を作成する
    ///
    /// # エラー
    ///
    /// フィールド名が空、または演算子が 1 つもない場合は `DomainError::Validation`。
    pub fn new(
        field: impl Into<String>,
        predicates: BTreeMap<RuleOperator, JsonValue>,
    ) -> Result<Self, DomainError> {
        let field = field.into().trim().to_string();
        if field.is_empty() {
            return Err(DomainError::Validation(
                "条件フィールドは必須です".to_string(),
            ));
        }
        if predicates.is_empty() {
            return Err(DomainError::Validation(format!(
                "条件フィールド '{}' に演算子がありません",
                field
            )));
        }
        Ok(Self { field, predicates })
    }

    /// 単一演算子の条件を作成する
    pub fn single(
        field: impl Into<String>,
        operator: RuleOperator,
        value: impl Into<JsonValue>,
    ) -> Result<Self, DomainError> {
        Self::new(field, BTreeMap::from([(operator, value.into())]))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn predicates(&self) -> &BTreeMap<RuleOperator, JsonValue> {
        &self.predicates
    }

    /// コンテキストに対して条件が成立するか
    pub fn matches(&self, context: &DocumentContext) -> bool {
        let Some(actual) = context.get(&self.field) else {
            return false;
        };
        !self.predicates.is_empty()
            && self
                .predicates
                .iter()
                .all(|(operator, expected)| operator.holds(actual, expected))
    }
}

/// ルーティングルール
///
/// 条件が成立したとき `target_levels` を必須レベルに追加する。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "JsonValue")]
pub struct RoutingRule {
    condition:     RuleCondition,
    target_levels: BTreeSet<LevelNumber>,
}

impl RoutingRule {
    pub fn new(condition: RuleCondition, target_levels: BTreeSet<LevelNumber>) -> Self {
        Self {
            condition,
            target_levels,
        }
    }

    pub fn condition(&self) -> &RuleCondition {
        &self.condition
    }

    pub fn target_levels(&self) -> &BTreeSet<LevelNumber> {
        &self.target_levels
    }

    /// JSON 表現からルールを作成する（フラット形式・オブジェクト形式の両対応）
    pub fn from_json(value: &JsonValue) -> Result<Self, DomainError> {
        let object = value.as_object().ok_or_else(|| {
            DomainError::Validation("ルーティングルールは JSON オブジェクトである必要があります".to_string())
        })?;

        let target_levels = parse_target_levels(object.get("targetLevels"))?;

        let condition = match (object.get("condition"), object.get("conditionField")) {
            (Some(condition), _) => parse_object_condition(condition)?,
            (None, Some(field)) => parse_flat_condition(field, object)?,
            (None, None) => {
                return Err(DomainError::Validation(
                    "ルーティングルールに condition または conditionField が必要です".to_string(),
                ));
            }
        };

        Ok(Self::new(condition, target_levels))
    }

    /// 正規化したオブジェクト形式の JSON 表現
    pub fn to_json(&self) -> JsonValue {
        let predicates: Map<String, JsonValue> = self
            .condition
            .predicates
            .iter()
            .map(|(operator, value)| (operator.as_str().to_string(), value.clone()))
            .collect();
        let mut condition = Map::new();
        condition.insert(self.condition.field.clone(), JsonValue::Object(predicates));
        serde_json::json!({
            "condition": condition,
            "targetLevels": self.target_levels.iter().map(LevelNumber::as_u32).collect::<Vec<_>>(),
        })
    }
}

impl TryFrom<JsonValue> for RoutingRule {
    type Error = DomainError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl Serialize for RoutingRule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn parse_target_levels(value: Option<&JsonValue>) -> Result<BTreeSet<LevelNumber>, DomainError> {
    let items = value.and_then(JsonValue::as_array).ok_or_else(|| {
        DomainError::Validation("targetLevels は配列である必要があります".to_string())
    })?;
    items
        .iter()
        .map(|item| {
            let number = item
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    DomainError::Validation(format!("不正なレベル番号: {}", item))
                })?;
            LevelNumber::new(number)
        })
        .collect()
}

fn parse_flat_condition(
    field: &JsonValue,
    object: &Map<String, JsonValue>,
) -> Result<RuleCondition, DomainError> {
    let field = field.as_str().ok_or_else(|| {
        DomainError::Validation("conditionField は文字列である必要があります".to_string())
    })?;
    let operator: RuleOperator = object
        .get("operator")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| DomainError::Validation("operator は必須です".to_string()))?
        .parse()?;
    let value = object
        .get("comparisonValue")
        .cloned()
        .unwrap_or(JsonValue::Null);
    RuleCondition::single(field, operator, value)
}

fn parse_object_condition(condition: &JsonValue) -> Result<RuleCondition, DomainError> {
    let fields = condition.as_object().ok_or_else(|| {
        DomainError::Validation("condition は JSON オブジェクトである必要があります".to_string())
    })?;
    let mut entries = fields.iter();
    let (Some((field, spec)), None) = (entries.next(), entries.next()) else {
        return Err(DomainError::Validation(
            "condition はちょうど 1 つのフィールドを持つ必要があります".to_string(),
        ));
    };

    let predicates = match spec {
        JsonValue::Object(operators) => operators
            .iter()
            .map(|(token, value)| Ok((token.parse::<RuleOperator>()?, value.clone())))
            .collect::<Result<BTreeMap<_, _>, DomainError>>()?,
        scalar => BTreeMap::from([(RuleOperator::Eq, scalar.clone())]),
    };
    RuleCondition::new(field.as_str(), predicates)
}

/// ルールをコンテキストに対して評価する
///
/// 副作用を持たない純粋関数。判定不能なケースは不成立として扱う。
pub fn evaluate(rule: &RoutingRule, context: &DocumentContext) -> bool {
    rule.condition.matches(context)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn levels(numbers: &[u32]) -> BTreeSet<LevelNumber> {
        numbers.iter().map(|n| LevelNumber::new(*n).unwrap()).collect()
    }

    fn rule(field: &str, operator: RuleOperator, value: JsonValue) -> RoutingRule {
        RoutingRule::new(
            RuleCondition::single(field, operator, value).unwrap(),
            levels(&[2]),
        )
    }

    fn context(value: JsonValue) -> DocumentContext {
        DocumentContext::from_json(value).unwrap()
    }

    #[rstest]
    #[case(RuleOperator::Gt, json!(10000), json!(50000), true)]
    #[case(RuleOperator::Gt, json!(10000), json!(10000), false)]
    #[case(RuleOperator::Gte, json!(10000), json!(10000), true)]
    #[case(RuleOperator::Lt, json!(10000), json!(5000), true)]
    #[case(RuleOperator::Lte, json!(10000), json!(10001), false)]
    #[case(RuleOperator::Eq, json!("IT"), json!("IT"), true)]
    #[case(RuleOperator::Ne, json!("IT"), json!("OFFICE"), true)]
    #[case(RuleOperator::In, json!(["A", "B"]), json!("B"), true)]
    #[case(RuleOperator::In, json!(["A", "B"]), json!("C"), false)]
    #[case(RuleOperator::NotIn, json!(["A", "B"]), json!("C"), true)]
    #[case(RuleOperator::NotIn, json!(["A", "B"]), json!("A"), false)]
    fn test_演算子ごとの評価(
        #[case] operator: RuleOperator,
        #[case] expected: JsonValue,
        #[case] actual: JsonValue,
        #[case] matched: bool,
    ) {
        let sut = rule("field", operator, expected);

        assert_eq!(evaluate(&sut, &context(json!({"field": actual}))), matched);
    }

    #[test]
    fn test_フィールドが存在しない場合は不成立() {
        let sut = rule("amount", RuleOperator::Ne, json!(0));

        assert!(!evaluate(&sut, &context(json!({"category": "IT"}))));
    }

    #[test]
    fn test_数値文字列は数値として比較される() {
        let sut = rule("amount", RuleOperator::Gt, json!(10000));

        assert!(evaluate(&sut, &context(json!({"amount": "50000"}))));
        assert!(evaluate(
            &rule("amount", RuleOperator::Eq, json!("100")),
            &context(json!({"amount": 100.0}))
        ));
    }

    #[test]
    fn test_文字列同士は辞書順で比較される() {
        let sut = rule("tier", RuleOperator::Lte, json!("B"));

        assert!(evaluate(&sut, &context(json!({"tier": "A"}))));
        assert!(!evaluate(&sut, &context(json!({"tier": "C"}))));
    }

    #[rstest]
    #[case(json!(true))]
    #[case(json!({"nested": 1}))]
    #[case(json!([1, 2]))]
    fn test_比較できない型の大小比較は不成立(#[case] actual: JsonValue) {
        let gt = rule("field", RuleOperator::Gt, json!(1));
        let lte = rule("field", RuleOperator::Lte, json!(1));

        assert!(!evaluate(&gt, &context(json!({"field": actual.clone()}))));
        assert!(!evaluate(&lte, &context(json!({"field": actual}))));
    }

    #[test]
    fn test_in_の比較値が配列でない場合はどちらも不成立() {
        let in_rule = rule("tier", RuleOperator::In, json!("A"));
        let not_in_rule = rule("tier", RuleOperator::NotIn, json!("A"));

        assert!(!evaluate(&in_rule, &context(json!({"tier": "A"}))));
        assert!(!evaluate(&not_in_rule, &context(json!({"tier": "B"}))));
    }

    #[test]
    fn test_配列フィールドに対するinは要素のいずれかが含まれれば成立() {
        let sut = rule("categories", RuleOperator::In, json!(["CHEMICAL", "HAZARD"]));

        assert!(evaluate(&sut, &context(json!({"categories": ["OFFICE", "HAZARD"]}))));
        assert!(!evaluate(&sut, &context(json!({"categories": ["OFFICE"]}))));
    }

    #[test]
    fn test_同一フィールドの複数演算子はandで評価される() {
        let sut = RoutingRule::from_json(&json!({
            "condition": {"amount": {"gte": 10000, "lt": 100000}},
            "targetLevels": [2]
        }))
        .unwrap();

        assert!(evaluate(&sut, &context(json!({"amount": 10000}))));
        assert!(!evaluate(&sut, &context(json!({"amount": 100000}))));
        assert!(!evaluate(&sut, &context(json!({"amount": 9999}))));
    }

    #[test]
    fn test_評価は何度呼んでも同じ結果を返す() {
        let sut = rule("amount", RuleOperator::Gt, json!(10000));
        let ctx = context(json!({"amount": 20000}));

        let results: Vec<bool> = (0..5).map(|_| evaluate(&sut, &ctx)).collect();

        assert_eq!(results, vec![true; 5]);
    }

    // --- パース ---

    #[test]
    fn test_フラット形式をパースできる() {
        let sut = RoutingRule::from_json(&json!({
            "conditionField": "amount",
            "operator": "gt",
            "comparisonValue": 10000,
            "targetLevels": [2, 3]
        }))
        .unwrap();

        assert_eq!(sut.condition().field(), "amount");
        assert_eq!(
            sut.condition().predicates(),
            &BTreeMap::from([(RuleOperator::Gt, json!(10000))])
        );
        assert_eq!(sut.target_levels(), &levels(&[2, 3]));
    }

    #[test]
    fn test_スカラー値の条件はeqとみなす() {
        let sut = RoutingRule::from_json(&json!({
            "condition": {"category": "CAPEX"},
            "targetLevels": [3]
        }))
        .unwrap();

        assert_eq!(
            sut.condition().predicates(),
            &BTreeMap::from([(RuleOperator::Eq, json!("CAPEX"))])
        );
    }

    #[rstest]
    #[case(json!({"conditionField": "amount", "operator": "between", "comparisonValue": 1, "targetLevels": [1]}))]
    #[case(json!({"condition": {"amount": {"regex": "^1"}}, "targetLevels": [1]}))]
    fn test_未知の演算子はパース時に拒否される(#[case] value: JsonValue) {
        let result = RoutingRule::from_json(&value);

        assert!(matches!(result, Err(DomainError::UnsupportedOperator(_))));
    }

    #[rstest]
    #[case(json!({"condition": {"amount": {}}, "targetLevels": [1]}))]
    #[case(json!({"condition": {}, "targetLevels": [1]}))]
    #[case(json!({"condition": {"a": 1, "b": 2}, "targetLevels": [1]}))]
    #[case(json!({"conditionField": "amount", "operator": "gt", "comparisonValue": 1, "targetLevels": [0]}))]
    #[case(json!({"conditionField": "amount", "operator": "gt", "comparisonValue": 1}))]
    #[case(json!({"targetLevels": [1]}))]
    fn test_不正なルールはパース時に拒否される(#[case] value: JsonValue) {
        assert!(RoutingRule::from_json(&value).is_err());
    }

    #[test]
    fn test_シリアライズはオブジェクト形式に正規化される() {
        let sut = RoutingRule::from_json(&json!({
            "conditionField": "amount",
            "operator": "not_in",
            "comparisonValue": [1, 2],
            "targetLevels": [3, 2]
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&sut).unwrap(),
            json!({"condition": {"amount": {"not_in": [1, 2]}}, "targetLevels": [2, 3]})
        );
        let restored: RoutingRule = serde_json::from_value(sut.to_json()).unwrap();
        assert_eq!(restored, sut);
    }
}
