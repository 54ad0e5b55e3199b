//! ユースケース層の共通ヘルパー
//!
//! リポジトリ呼び出し結果の変換など、複数のユースケースで繰り返されるパターンを共通化する。

use procureflow_domain::workflow::ValidationError;
use procureflow_infra::InfraError;

use crate::error::CoreError;

/// リポジトリの `Result<Option<T>, InfraError>` を `Result<T, CoreError>` に変換する
///
/// ```ignore
/// let instance = self.deps.instance_repo.find_by_id(&id).await
///     .or_not_found(|| CoreError::InstanceNotFound(id.clone()))?;
/// ```
pub(crate) trait FindResultExt<T> {
    /// `None` の場合は `not_found` のエラー、`InfraError` の場合は `CoreError::Database` を返す
    fn or_not_found(self, not_found: impl FnOnce() -> CoreError) -> Result<T, CoreError>;
}

impl<T> FindResultExt<T> for Result<Option<T>, InfraError> {
    fn or_not_found(self, not_found: impl FnOnce() -> CoreError) -> Result<T, CoreError> {
        self?.ok_or_else(not_found)
    }
}

/// 検証エラーの一覧を 1 つの `CoreError::Validation` にまとめる
pub(crate) fn validation_error(errors: &[ValidationError]) -> CoreError {
    use itertools::Itertools as _;

    CoreError::Validation(errors.iter().map(|e| e.message.as_str()).join("; "))
}
