use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000101_create_settings_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StoreSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StoreSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StoreSettings::StoreName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StoreSettings::Address).string_len(512).null())
                    .col(ColumnDef::new(StoreSettings::Phone).string_len(64).null())
                    .col(ColumnDef::new(StoreSettings::Email).string_len(255).null())
                    .col(
                        ColumnDef::new(StoreSettings::Currency)
                            .string_len(3)
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(StoreSettings::TaxRate)
                            .decimal_len(6, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StoreSettings::ReceiptFooter).text().null())
                    .col(
                        ColumnDef::new(StoreSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentConfigs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentConfigs::StripePublishableKey)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentConfigs::StripeSecretKey)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentConfigs::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PaymentConfigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PaymentConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentConfigs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StoreSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum StoreSettings {
    Table,
    Id,
    StoreName,
    Address,
    Phone,
    Email,
    Currency,
    TaxRate,
    ReceiptFooter,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum PaymentConfigs {
    Table,
    Id,
    StripePublishableKey,
    StripeSecretKey,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
