//! Mapping between the wire enums in `api_types` and the engine's.

use api_types::{bill, group, investment};

pub fn group_kind(kind: group::GroupKind) -> engine::GroupKind {
    match kind {
        group::GroupKind::Friends => engine::GroupKind::Friends,
        group::GroupKind::Family => engine::GroupKind::Family,
        group::GroupKind::Roommates => engine::GroupKind::Roommates,
        group::GroupKind::Colleagues => engine::GroupKind::Colleagues,
        group::GroupKind::InvestmentClub => engine::GroupKind::InvestmentClub,
        group::GroupKind::Custom => engine::GroupKind::Custom,
    }
}

pub fn strategy(strategy: group::InvestmentStrategy) -> engine::InvestmentStrategy {
    match strategy {
        group::InvestmentStrategy::Conservative => engine::InvestmentStrategy::Conservative,
        group::InvestmentStrategy::Moderate => engine::InvestmentStrategy::Moderate,
        group::InvestmentStrategy::Aggressive => engine::InvestmentStrategy::Aggressive,
        group::InvestmentStrategy::Custom => engine::InvestmentStrategy::Custom,
    }
}

pub fn member_role(role: group::MemberRole) -> engine::MemberRole {
    match role {
        group::MemberRole::Owner => engine::MemberRole::Owner,
        group::MemberRole::Admin => engine::MemberRole::Admin,
        group::MemberRole::Member => engine::MemberRole::Member,
        group::MemberRole::Viewer => engine::MemberRole::Viewer,
    }
}

pub fn member_status(status: group::MemberStatus) -> engine::MemberStatus {
    match status {
        group::MemberStatus::Active => engine::MemberStatus::Active,
        group::MemberStatus::Invited => engine::MemberStatus::Invited,
        group::MemberStatus::Pending => engine::MemberStatus::Pending,
        group::MemberStatus::Suspended => engine::MemberStatus::Suspended,
        group::MemberStatus::Removed => engine::MemberStatus::Removed,
    }
}

pub fn bill_status(status: bill::BillStatus) -> engine::BillStatus {
    match status {
        bill::BillStatus::Draft => engine::BillStatus::Draft,
        bill::BillStatus::Pending => engine::BillStatus::Pending,
        bill::BillStatus::Processing => engine::BillStatus::Processing,
        bill::BillStatus::Completed => engine::BillStatus::Completed,
        bill::BillStatus::Failed => engine::BillStatus::Failed,
        bill::BillStatus::Cancelled => engine::BillStatus::Cancelled,
    }
}

pub fn trade_action(action: investment::TradeAction) -> engine::TradeAction {
    match action {
        investment::TradeAction::Buy => engine::TradeAction::Buy,
        investment::TradeAction::Sell => engine::TradeAction::Sell,
        investment::TradeAction::Hold => engine::TradeAction::Hold,
        investment::TradeAction::Rebalance => engine::TradeAction::Rebalance,
    }
}

pub fn decision(decision: investment::Decision) -> engine::Decision {
    match decision {
        investment::Decision::Yes => engine::Decision::Yes,
        investment::Decision::No => engine::Decision::No,
        investment::Decision::Abstain => engine::Decision::Abstain,
    }
}
