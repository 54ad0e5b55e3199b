//! # 共通値オブジェクト
//!
//! 複数のエンティティで共有される値オブジェクトを定義する。
//!
//! ## 設計方針
//!
//! - **Newtype パターン**: プリミティブ型をラップし、型安全性を確保
//! - **バリデーション**: 生成時に検証し、不正な値の存在を型レベルで排除
//! - **不変性**: 一度作成したら変更不可
//!
//! ## 含まれる型
//!
//! | 型 | ラップ対象 | 用途 |
//! |---|-----------|------|
//! | [`Version`] | `u32` | 楽観的ロック用のバージョン番号 |
//! | [`LevelNumber`] | `u32` | 承認レベル番号（1 始まり） |
//! | [`WorkflowName`] | `String` | ワークフロー定義名 |
//! | [`LevelName`] | `String` | 承認レベル名 |

use serde::{Deserialize, Serialize};

use crate::DomainError;

// =========================================================================
// Version（バージョン番号）
// =========================================================================

/// バージョン番号（値オブジェクト）
///
/// 定義・インスタンスの楽観的ロックに使用。
/// 1 から始まり、更新のたびにインクリメントされる。
///
/// # 不変条件
///
/// - バージョン番号は 1 以上
///
/// # 使用例
///
/// ```rust
/// use procureflow_domain::value_objects::Version;
///
/// let v1 = Version::initial();
/// assert_eq!(v1.as_u32(), 1);
///
/// let v2 = v1.next();
/// assert_eq!(v2.as_u32(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u32);

impl Version {
    /// 初期バージョン（1）を作成する
    pub fn initial() -> Self {
        Self(1)
    }

    /// 指定した値からバージョンを作成する
    ///
    /// # エラー
    ///
    /// 0 の場合は `DomainError::Validation` を返す。
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::Validation(
                "バージョン番号は 1 以上である必要があります".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// 次のバージョンを返す
    ///
    /// u32 の最大値で飽和する。実運用では到達しない想定。
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// 内部の u32 値を取得する
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// i32 に変換する（DB 互換用）
    ///
    /// i32 の範囲を超える場合は `i32::MAX` に丸める。
    pub fn as_i32(&self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }
}

impl TryFrom<i32> for Version {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| {
            DomainError::Validation("バージョン番号は 1 以上である必要があります".to_string())
        })?;
        Self::new(value)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// =========================================================================
// LevelNumber（承認レベル番号）
// =========================================================================

/// 承認レベル番号（値オブジェクト）
///
/// 定義内の承認レベルを識別する 1 始まりの連番。
/// 順序付き集合（`BTreeSet`）に格納したとき昇順に並ぶよう `Ord` を実装する。
///
/// # 使用例
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use procureflow_domain::value_objects::LevelNumber;
///
/// let level = LevelNumber::new(2)?;
/// assert_eq!(level.as_u32(), 2);
/// assert!(LevelNumber::new(0).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct LevelNumber(u32);

impl LevelNumber {
    /// 最初のレベル（1）
    pub const FIRST: Self = Self(1);

    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::Validation(
                "レベル番号は 1 以上である必要があります".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// 直後のレベル番号
    pub fn successor(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl TryFrom<u32> for LevelNumber {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LevelNumber> for u32 {
    fn from(level: LevelNumber) -> Self {
        level.0
    }
}

impl std::fmt::Display for LevelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =========================================================================
// WorkflowName / LevelName
// =========================================================================

define_validated_string! {
    /// ワークフロー名（値オブジェクト）
    ///
    /// # バリデーション
    ///
    /// - 空文字列不可（trim 後）
    /// - 最大 200 文字
    pub struct WorkflowName {
        label: "ワークフロー名",
        max_length: 200,
    }
}

define_validated_string! {
    /// 承認レベル名（値オブジェクト）
    ///
    /// 「部門長承認」「購買部長承認」など。
    ///
    /// # バリデーション
    ///
    /// - 空文字列不可（trim 後）
    /// - 最大 100 文字
    pub struct LevelName {
        label: "レベル名",
        max_length: 100,
    }
}
