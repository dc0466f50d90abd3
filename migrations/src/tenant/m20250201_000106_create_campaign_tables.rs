use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000106_create_campaign_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Campaigns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Campaigns::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Campaigns::Subtitle).string_len(255).null())
                    .col(ColumnDef::new(Campaigns::BadgeLabel).string_len(64).null())
                    .col(ColumnDef::new(Campaigns::BadgeColor).string_len(32).null())
                    .col(ColumnDef::new(Campaigns::Tagline).string_len(255).null())
                    .col(
                        ColumnDef::new(Campaigns::CampaignType)
                            .string_len(32)
                            .not_null()
                            .default("flash_sale"),
                    )
                    .col(
                        ColumnDef::new(Campaigns::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Campaigns::StartDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::EndDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::Slug)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Campaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Campaigns::UpdatedAt)
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
                    .table(CampaignProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CampaignProducts::CampaignId).uuid().not_null())
                    .col(ColumnDef::new(CampaignProducts::ProductId).uuid().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_products_campaign")
                            .from(CampaignProducts::Table, CampaignProducts::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_products_product")
                            .from(CampaignProducts::Table, CampaignProducts::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_products_unique")
                    .table(CampaignProducts::Table)
                    .col(CampaignProducts::CampaignId)
                    .col(CampaignProducts::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CampaignProducts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
pub enum Campaigns {
    Table,
    Id,
    Title,
    Subtitle,
    BadgeLabel,
    BadgeColor,
    Tagline,
    CampaignType,
    SortOrder,
    StartDate,
    EndDate,
    Slug,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum CampaignProducts {
    Table,
    Id,
    CampaignId,
    ProductId,
}
