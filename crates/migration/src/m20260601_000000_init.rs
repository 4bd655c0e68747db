//! Initial schema.
//!
//! - `users`: authentication and linked payment/bank references
//! - `groups`, `group_members`: groups and memberships with running balances
//! - `bills`, `bill_items`, `bill_item_claims`, `bill_participants`: shared
//!   bills, who claimed which line, and obligations
//! - `investment_votes`, `vote_ballots`: proposals and one ballot per member
//! - `investments`: positions appended by trade execution
//! - `transactions`: the append-only ledger
//! - `notifications`: in-app notifications
//! - `virtual_cards`: single-use cards issued to pay a bill

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    Password,
    DisplayName,
    Phone,
    PaymentCustomerRef,
    BankAccessToken,
}

#[derive(Iden)]
enum Groups {
    Table,
    Id,
    Name,
    Description,
    Kind,
    Strategy,
    VoteThresholdPct,
    Currency,
    CreatedBy,
    TotalSplitMinor,
    TotalInvestedMinor,
    CreatedAt,
}

#[derive(Iden)]
enum GroupMembers {
    Table,
    GroupId,
    Username,
    Role,
    Status,
    BalanceMinor,
    InvitedBy,
    JoinedAt,
}

#[derive(Iden)]
enum Bills {
    Table,
    Id,
    GroupId,
    CreatedBy,
    Merchant,
    SubtotalMinor,
    TaxMinor,
    TipMinor,
    TotalMinor,
    Currency,
    ReceiptSource,
    Status,
    CreatedAt,
    SettledAt,
}

#[derive(Iden)]
enum BillItems {
    Table,
    BillId,
    ItemId,
    Position,
    Name,
    PriceMinor,
}

#[derive(Iden)]
enum BillItemClaims {
    Table,
    BillId,
    ItemId,
    Username,
}

#[derive(Iden)]
enum VirtualCards {
    Table,
    Id,
    GroupId,
    BillId,
    Username,
    CardRef,
    Last4,
    Brand,
    SpendingLimitMinor,
    SpentMinor,
    Currency,
    Status,
    ExpiresAt,
    UsedAt,
    CreatedAt,
}

#[derive(Iden)]
enum BillParticipants {
    Table,
    Id,
    BillId,
    Username,
    OwedMinor,
    PaidMinor,
    Status,
    ChargeRef,
    FailureReason,
    PaidAt,
}

#[derive(Iden)]
enum InvestmentVotes {
    Table,
    Id,
    GroupId,
    ProposedBy,
    Action,
    Symbol,
    AmountMinor,
    SharesMicros,
    Reasoning,
    VotesRequired,
    Status,
    ExpiresAt,
    CreatedAt,
    DecidedAt,
    ExecutedAt,
    ExecutionError,
}

#[derive(Iden)]
enum VoteBallots {
    Table,
    VoteId,
    Username,
    Decision,
    CastAt,
}

#[derive(Iden)]
enum Investments {
    Table,
    Id,
    GroupId,
    VoteId,
    Symbol,
    Name,
    SharesMicros,
    AvgCostMinor,
    CurrentPriceMinor,
    CreatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    Username,
    GroupId,
    BillId,
    InvestmentId,
    VoteId,
    Kind,
    Direction,
    AmountMinor,
    Currency,
    Status,
    Description,
    CreatedAt,
}

#[derive(Iden)]
enum Notifications {
    Table,
    Id,
    Username,
    Kind,
    Title,
    Message,
    Data,
    Read,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string())
                    .col(ColumnDef::new(Users::Phone).string())
                    .col(ColumnDef::new(Users::PaymentCustomerRef).string())
                    .col(ColumnDef::new(Users::BankAccessToken).string())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Groups
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Groups::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Groups::Name).string().not_null())
                    .col(ColumnDef::new(Groups::Description).string())
                    .col(ColumnDef::new(Groups::Kind).string().not_null())
                    .col(ColumnDef::new(Groups::Strategy).string().not_null())
                    .col(
                        ColumnDef::new(Groups::VoteThresholdPct)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(Groups::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(ColumnDef::new(Groups::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Groups::TotalSplitMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Groups::TotalInvestedMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Groups::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-groups-created_by")
                            .from(Groups::Table, Groups::CreatedBy)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Group members
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(GroupMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GroupMembers::GroupId).string().not_null())
                    .col(ColumnDef::new(GroupMembers::Username).string().not_null())
                    .col(ColumnDef::new(GroupMembers::Role).string().not_null())
                    .col(ColumnDef::new(GroupMembers::Status).string().not_null())
                    .col(
                        ColumnDef::new(GroupMembers::BalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(GroupMembers::InvitedBy).string())
                    .col(ColumnDef::new(GroupMembers::JoinedAt).timestamp())
                    .primary_key(
                        Index::create()
                            .col(GroupMembers::GroupId)
                            .col(GroupMembers::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-group_id")
                            .from(GroupMembers::Table, GroupMembers::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-username")
                            .from(GroupMembers::Table, GroupMembers::Username)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-group_members-username")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::Username)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Bills
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bills::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Bills::GroupId).string().not_null())
                    .col(ColumnDef::new(Bills::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Bills::Merchant).string())
                    .col(ColumnDef::new(Bills::SubtotalMinor).big_integer().not_null())
                    .col(ColumnDef::new(Bills::TaxMinor).big_integer().not_null())
                    .col(ColumnDef::new(Bills::TipMinor).big_integer().not_null())
                    .col(ColumnDef::new(Bills::TotalMinor).big_integer().not_null())
                    .col(ColumnDef::new(Bills::Currency).string().not_null())
                    .col(ColumnDef::new(Bills::ReceiptSource).string().not_null())
                    .col(ColumnDef::new(Bills::Status).string().not_null())
                    .col(ColumnDef::new(Bills::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Bills::SettledAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bills-group_id")
                            .from(Bills::Table, Bills::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bills-group_id-created_at")
                    .table(Bills::Table)
                    .col(Bills::GroupId)
                    .col(Bills::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bills-status")
                    .table(Bills::Table)
                    .col(Bills::Status)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Bill items
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BillItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BillItems::BillId).string().not_null())
                    .col(ColumnDef::new(BillItems::ItemId).big_integer().not_null())
                    .col(ColumnDef::new(BillItems::Position).integer().not_null())
                    .col(ColumnDef::new(BillItems::Name).string().not_null())
                    .col(ColumnDef::new(BillItems::PriceMinor).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(BillItems::BillId)
                            .col(BillItems::ItemId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bill_items-bill_id")
                            .from(BillItems::Table, BillItems::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillItemClaims::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BillItemClaims::BillId).string().not_null())
                    .col(
                        ColumnDef::new(BillItemClaims::ItemId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BillItemClaims::Username).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(BillItemClaims::BillId)
                            .col(BillItemClaims::ItemId)
                            .col(BillItemClaims::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bill_item_claims-item")
                            .from(
                                BillItemClaims::Table,
                                (BillItemClaims::BillId, BillItemClaims::ItemId),
                            )
                            .to(BillItems::Table, (BillItems::BillId, BillItems::ItemId))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Bill participants
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BillParticipants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BillParticipants::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BillParticipants::BillId).string().not_null())
                    .col(
                        ColumnDef::new(BillParticipants::Username)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BillParticipants::OwedMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BillParticipants::PaidMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BillParticipants::Status).string().not_null())
                    .col(ColumnDef::new(BillParticipants::ChargeRef).string())
                    .col(ColumnDef::new(BillParticipants::FailureReason).string())
                    .col(ColumnDef::new(BillParticipants::PaidAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bill_participants-bill_id")
                            .from(BillParticipants::Table, BillParticipants::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bill_participants-bill_id-username-unique")
                    .table(BillParticipants::Table)
                    .col(BillParticipants::BillId)
                    .col(BillParticipants::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bill_participants-username")
                    .table(BillParticipants::Table)
                    .col(BillParticipants::Username)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Investment votes
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(InvestmentVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvestmentVotes::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InvestmentVotes::GroupId).string().not_null())
                    .col(
                        ColumnDef::new(InvestmentVotes::ProposedBy)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvestmentVotes::Action).string().not_null())
                    .col(ColumnDef::new(InvestmentVotes::Symbol).string().not_null())
                    .col(
                        ColumnDef::new(InvestmentVotes::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvestmentVotes::SharesMicros)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(InvestmentVotes::Reasoning).string())
                    .col(
                        ColumnDef::new(InvestmentVotes::VotesRequired)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvestmentVotes::Status).string().not_null())
                    .col(
                        ColumnDef::new(InvestmentVotes::ExpiresAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvestmentVotes::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvestmentVotes::DecidedAt).timestamp())
                    .col(ColumnDef::new(InvestmentVotes::ExecutedAt).timestamp())
                    .col(ColumnDef::new(InvestmentVotes::ExecutionError).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-investment_votes-group_id")
                            .from(InvestmentVotes::Table, InvestmentVotes::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-investment_votes-status-expires_at")
                    .table(InvestmentVotes::Table)
                    .col(InvestmentVotes::Status)
                    .col(InvestmentVotes::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Vote ballots
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(VoteBallots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(VoteBallots::VoteId).string().not_null())
                    .col(ColumnDef::new(VoteBallots::Username).string().not_null())
                    .col(ColumnDef::new(VoteBallots::Decision).string())
                    .col(ColumnDef::new(VoteBallots::CastAt).timestamp())
                    .primary_key(
                        Index::create()
                            .col(VoteBallots::VoteId)
                            .col(VoteBallots::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-vote_ballots-vote_id")
                            .from(VoteBallots::Table, VoteBallots::VoteId)
                            .to(InvestmentVotes::Table, InvestmentVotes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 9. Investments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Investments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Investments::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Investments::GroupId).string().not_null())
                    .col(
                        ColumnDef::new(Investments::VoteId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Investments::Symbol).string().not_null())
                    .col(ColumnDef::new(Investments::Name).string().not_null())
                    .col(
                        ColumnDef::new(Investments::SharesMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Investments::AvgCostMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Investments::CurrentPriceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Investments::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-investments-group_id")
                            .from(Investments::Table, Investments::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-investments-vote_id")
                            .from(Investments::Table, Investments::VoteId)
                            .to(InvestmentVotes::Table, InvestmentVotes::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 10. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::Username).string().not_null())
                    .col(ColumnDef::new(Transactions::GroupId).string())
                    .col(ColumnDef::new(Transactions::BillId).string())
                    .col(ColumnDef::new(Transactions::InvestmentId).string())
                    .col(ColumnDef::new(Transactions::VoteId).string())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::Direction).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-username")
                            .from(Transactions::Table, Transactions::Username)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-username-created_at")
                    .table(Transactions::Table)
                    .col(Transactions::Username)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-group_id")
                    .table(Transactions::Table)
                    .col(Transactions::GroupId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 11. Notifications
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::Username).string().not_null())
                    .col(ColumnDef::new(Notifications::Kind).string().not_null())
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(ColumnDef::new(Notifications::Message).string().not_null())
                    .col(ColumnDef::new(Notifications::Data).json().not_null())
                    .col(
                        ColumnDef::new(Notifications::Read)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-notifications-username")
                            .from(Notifications::Table, Notifications::Username)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-notifications-username-created_at")
                    .table(Notifications::Table)
                    .col(Notifications::Username)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 12. Virtual cards
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(VirtualCards::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VirtualCards::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VirtualCards::GroupId).string().not_null())
                    .col(ColumnDef::new(VirtualCards::BillId).string().not_null())
                    .col(ColumnDef::new(VirtualCards::Username).string().not_null())
                    .col(ColumnDef::new(VirtualCards::CardRef).string().unique_key())
                    .col(ColumnDef::new(VirtualCards::Last4).string().not_null())
                    .col(ColumnDef::new(VirtualCards::Brand).string().not_null())
                    .col(
                        ColumnDef::new(VirtualCards::SpendingLimitMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VirtualCards::SpentMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(VirtualCards::Currency).string().not_null())
                    .col(ColumnDef::new(VirtualCards::Status).string().not_null())
                    .col(
                        ColumnDef::new(VirtualCards::ExpiresAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VirtualCards::UsedAt).timestamp())
                    .col(
                        ColumnDef::new(VirtualCards::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-virtual_cards-bill_id")
                            .from(VirtualCards::Table, VirtualCards::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-virtual_cards-username")
                            .from(VirtualCards::Table, VirtualCards::Username)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-virtual_cards-bill_id")
                    .table(VirtualCards::Table)
                    .col(VirtualCards::BillId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation.
        manager
            .drop_table(Table::drop().table(VirtualCards::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Investments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VoteBallots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InvestmentVotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BillParticipants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BillItemClaims::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BillItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
