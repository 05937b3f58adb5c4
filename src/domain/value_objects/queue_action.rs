use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// オフラインキューに積まれるアクションの種類。閉じた列挙で、
/// 未知の文字列は境界でバリデーションエラーになる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    AddToCart,
    RemoveFromCart,
    AddToWishlist,
    RemoveFromWishlist,
    EmailSignup,
    QrScan,
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::AddToCart => "add_to_cart",
            QueueAction::RemoveFromCart => "remove_from_cart",
            QueueAction::AddToWishlist => "add_to_wishlist",
            QueueAction::RemoveFromWishlist => "remove_from_wishlist",
            QueueAction::EmailSignup => "email_signup",
            QueueAction::QrScan => "qr_scan",
        }
    }

    /// Cart and wishlist state is authoritative on the client; these
    /// actions never need a remote replay.
    pub fn is_locally_authoritative(&self) -> bool {
        matches!(
            self,
            QueueAction::AddToCart
                | QueueAction::RemoveFromCart
                | QueueAction::AddToWishlist
                | QueueAction::RemoveFromWishlist
        )
    }
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add_to_cart" => Ok(QueueAction::AddToCart),
            "remove_from_cart" => Ok(QueueAction::RemoveFromCart),
            "add_to_wishlist" => Ok(QueueAction::AddToWishlist),
            "remove_from_wishlist" => Ok(QueueAction::RemoveFromWishlist),
            "email_signup" => Ok(QueueAction::EmailSignup),
            "qr_scan" => Ok(QueueAction::QrScan),
            other => Err(format!("Unknown queue action: {other}")),
        }
    }
}
