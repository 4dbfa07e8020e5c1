use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use shared::store::remove_items;
use shared::{Data, NoData, ProductInput, ProductListQuery, ProductType, ProductView};

use super::announce;
use crate::{client::ApiClient, render, screen::Screen};

#[derive(Subcommand)]
pub enum ProductsCommand {
    /// List products
    List {
        #[arg(long)]
        category: Option<String>,
        /// CHILLED or FROZEN
        #[arg(long = "type")]
        product_type: Option<ProductType>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List the categories in use
    Categories,
    /// Add a product
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: String,
        #[arg(long = "type")]
        product_type: ProductType,
        #[arg(long, default_value = "")]
        description: String,
        /// Upload this image and attach it to the product
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Remove a product and its image
    Delete { id: String },
}

fn first_page() -> ProductListQuery {
    ProductListQuery {
        page: 1,
        limit: shared::DEFAULT_PAGE_SIZE,
        ..ProductListQuery::default()
    }
}

pub async fn run(api: &ApiClient, command: ProductsCommand) -> Result<()> {
    match command {
        ProductsCommand::List {
            category,
            product_type,
            search,
            page,
        } => {
            let query = ProductListQuery {
                page,
                category,
                product_type,
                search,
                ..first_page()
            };
            let mut screen = Screen::new("products", &query);
            screen.refresh(api, "/api/products", &query).await?;
            if let Some(list) = screen.list() {
                render::products(list);
            }
        }
        ProductsCommand::Categories => {
            let categories = api
                .get::<Data<Vec<String>>>("/api/products/categories")
                .await?
                .data
                .data;
            for category in categories {
                println!("{}", category);
            }
        }
        ProductsCommand::Create {
            name,
            price,
            category,
            product_type,
            description,
            image,
        } => {
            let image_url = match image {
                Some(path) => Some(api.upload(&path).await?.data.url),
                None => None,
            };
            let input = ProductInput {
                name,
                description,
                price,
                category,
                product_type,
                image_url,
            };
            let reply = api.post::<Data<ProductView>, _>("/api/products", &input).await?;
            announce(reply.message, "Product created");
            println!("{}", reply.data.data.id);
        }
        ProductsCommand::Delete { id } => {
            let query = first_page();
            let mut screen: Screen<ProductView> = Screen::new("products", &query);
            screen.refresh(api, "/api/products", &query).await?;
            let ids = vec![id];
            let reply = screen
                .mutate(
                    |list| remove_items(list, &ids),
                    api.delete::<NoData>(&format!("/api/products/{}", ids[0])),
                )
                .await?;
            announce(reply.message, "Product deleted");
        }
    }
    Ok(())
}
