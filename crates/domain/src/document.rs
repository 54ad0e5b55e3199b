//! # 承認対象ドキュメント
//!
//! ワークフローが紐づく購買ドキュメントの種別・識別子と、
//! ルーティングルールの評価に使用するドキュメントコンテキストを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`DocumentType`] | ドキュメント種別 | 取引先登録・資材見積・発注書・前払 |
//! | [`DocumentId`] | ドキュメント ID | 種別内で一意な識別子 |
//! | [`DocumentContext`] | ドキュメントコンテキスト | 金額・カテゴリ・取引先ランク等の属性マップ |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use strum::IntoStaticStr;

use crate::DomainError;

/// ドキュメント種別
///
/// 永続化・ワイヤ表現は snake_case（`purchase_order` など）。
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
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
    /// 取引先登録
    Supplier,
    /// 資材見積
    MaterialQuotation,
    /// 発注書
    PurchaseOrder,
    /// 前払申請
    PrePayment,
}

impl DocumentType {
    /// ワイヤ表現を返す
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supplier" => Ok(Self::Supplier),
            "material_quotation" => Ok(Self::MaterialQuotation),
            "purchase_order" => Ok(Self::PurchaseOrder),
            "pre_payment" => Ok(Self::PrePayment),
            _ => Err(DomainError::Validation(format!(
                "不正なドキュメント種別: {}",
                s
            ))),
        }
    }
}

define_uuid_id! {
    /// ドキュメント ID
    pub struct DocumentId;
}

/// ドキュメントコンテキスト
///
/// ルーティングルールの評価対象となる属性マップ。
/// エンジンは開始時に一度だけ評価し、以後のルール・定義変更の影響を受けない。
///
/// フィールド参照はキーの完全一致を優先し、見つからなければ
/// ドット区切りのパス（`supplier.tier`）としてネストしたオブジェクトを辿る。
///
/// # 使用例
///
/// ```rust
/// use procureflow_domain::document::DocumentContext;
/// use serde_json::json;
///
/// let context = DocumentContext::from_json(json!({
///     "amount": 50000,
///     "supplier": {"tier": "A"}
/// }))
/// .unwrap();
///
/// assert_eq!(context.get("amount"), Some(&json!(50000)));
/// assert_eq!(context.get("supplier.tier"), Some(&json!("A")));
/// assert_eq!(context.get("category"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentContext(Map<String, JsonValue>);

impl DocumentContext {
    pub fn new(attributes: Map<String, JsonValue>) -> Self {
        Self(attributes)
    }

    /// JSON 値からコンテキストを作成する
    ///
    /// # エラー
    ///
    /// JSON オブジェクト以外の場合は `DomainError::Validation` を返す。
    pub fn from_json(value: JsonValue) -> Result<Self, DomainError> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(DomainError::Validation(format!(
                "ドキュメントコンテキストは JSON オブジェクトである必要があります: {}",
                other
            ))),
        }
    }

    /// 属性を追加したコンテキストを返す
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// フィールドの値を取得する
    ///
    /// 値が `null` の場合は存在しないものとして扱う。
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        let value = match self.0.get(field) {
            Some(value) => Some(value),
            None => Self::lookup_path(&self.0, field),
        };
        value.filter(|v| !v.is_null())
    }

    fn lookup_path<'a>(map: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
        let (head, rest) = path.split_once('.')?;
        let mut current = map.get(head)?;
        for segment in rest.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }
}
