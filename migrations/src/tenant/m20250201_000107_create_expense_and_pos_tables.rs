use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000107_create_expense_and_pos_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Expenses::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Expenses::ExpenseDate).date().not_null())
                    .col(ColumnDef::new(Expenses::Category).string_len(128).not_null())
                    .col(ColumnDef::new(Expenses::Amount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Expenses::Description).text().null())
                    .col(ColumnDef::new(Expenses::PaymentMethod).string_len(32).null())
                    .col(ColumnDef::new(Expenses::ReceiptUrl).string_len(1024).null())
                    .col(
                        ColumnDef::new(Expenses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expenses_expense_date")
                    .table(Expenses::Table)
                    .col(Expenses::ExpenseDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PosMappings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PosMappings::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(PosMappings::PosCode)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(PosMappings::PosName).string_len(255).not_null())
                    .col(ColumnDef::new(PosMappings::ProductId).uuid().null())
                    .col(
                        ColumnDef::new(PosMappings::Confidence)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PosMappings::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PosMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PosMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pos_mappings_product")
                            .from(PosMappings::Table, PosMappings::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PosMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
pub enum Expenses {
    Table,
    Id,
    ExpenseDate,
    Category,
    Amount,
    Description,
    PaymentMethod,
    ReceiptUrl,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum PosMappings {
    Table,
    Id,
    PosCode,
    PosName,
    ProductId,
    Confidence,
    IsVerified,
    CreatedAt,
    UpdatedAt,
}
