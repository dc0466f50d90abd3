use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000108_create_shelf_audit_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ShelfAudits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ShelfAudits::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(ShelfAudits::Status)
                            .string_len(16)
                            .not_null()
                            .default("in_progress"),
                    )
                    .col(ColumnDef::new(ShelfAudits::AuditedBy).uuid().null())
                    .col(ColumnDef::new(ShelfAudits::Notes).text().null())
                    .col(
                        ColumnDef::new(ShelfAudits::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ShelfAudits::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_shelf_audits_started_at")
                    .table(ShelfAudits::Table)
                    .col(ShelfAudits::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ShelfAuditItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShelfAuditItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ShelfAuditItems::AuditId).uuid().not_null())
                    .col(ColumnDef::new(ShelfAuditItems::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(ShelfAuditItems::ExpectedQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShelfAuditItems::ActualQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShelfAuditItems::Discrepancy)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shelf_audit_items_audit")
                            .from(ShelfAuditItems::Table, ShelfAuditItems::AuditId)
                            .to(ShelfAudits::Table, ShelfAudits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shelf_audit_items_product")
                            .from(ShelfAuditItems::Table, ShelfAuditItems::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ShelfAuditItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShelfAudits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
pub enum ShelfAudits {
    Table,
    Id,
    Status,
    AuditedBy,
    Notes,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
pub enum ShelfAuditItems {
    Table,
    Id,
    AuditId,
    ProductId,
    ExpectedQuantity,
    ActualQuantity,
    Discrepancy,
}
