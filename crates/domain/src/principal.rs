//! # 承認主体とロール参照
//!
//! 承認操作を行う主体（ユーザー）と、承認レベルに割り当てるロール参照を定義する。
//!
//! ロールのメンバー解決はドメイン層の責務外。インフラ層の `RoleDirectory` が
//! 無効化・削除済みの主体を除外したうえで解決する。

define_uuid_id! {
    /// 承認主体 ID
    ///
    /// 申請者・承認者・取消者など、ワークフローを操作するすべての主体を表す。
    pub struct PrincipalId;
}

define_validated_string! {
    /// ロール参照（値オブジェクト）
    ///
    /// 承認レベルに割り当てるロールのコード（例: `procurement_manager`）。
    ///
    /// # バリデーション
    ///
    /// - 空文字列不可（trim 後）
    /// - 最大 100 文字
    pub struct RoleRef {
        label: "ロール参照",
        max_length: 100,
    }
}

impl PartialOrd for RoleRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoleRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}
