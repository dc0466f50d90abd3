use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000002_create_global_products_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GlobalProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GlobalProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GlobalProducts::ProductName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GlobalProducts::Brand).string_len(255).null())
                    .col(
                        ColumnDef::new(GlobalProducts::Manufacturer)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(GlobalProducts::Category).string_len(128).null())
                    .col(
                        ColumnDef::new(GlobalProducts::Subcategory)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GlobalProducts::Upc)
                            .string_len(64)
                            .null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(GlobalProducts::ImageUrl).string_len(1024).null())
                    .col(ColumnDef::new(GlobalProducts::Description).text().null())
                    .col(
                        ColumnDef::new(GlobalProducts::BaseUnit)
                            .string_len(32)
                            .not_null()
                            .default("piece"),
                    )
                    .col(
                        ColumnDef::new(GlobalProducts::PackSize)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(GlobalProducts::Status)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(GlobalProducts::MetadataJson).text().null())
                    .col(
                        ColumnDef::new(GlobalProducts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GlobalProducts::UpdatedAt)
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
                    .name("idx_global_products_name")
                    .table(GlobalProducts::Table)
                    .col(GlobalProducts::ProductName)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GlobalProducts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum GlobalProducts {
    Table,
    Id,
    ProductName,
    Brand,
    Manufacturer,
    Category,
    Subcategory,
    Upc,
    ImageUrl,
    Description,
    BaseUnit,
    PackSize,
    Status,
    MetadataJson,
    CreatedAt,
    UpdatedAt,
}
