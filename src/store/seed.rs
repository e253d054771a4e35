//! Initial data for an empty database

use chrono::NaiveDate;
use tracing::info;

use super::catalog::{CatalogStore, NewCategory, NewCompany, NewInvoice};
use super::products::{NewProduct, ProductStore};
use super::stock::MovementOrigin;
use super::tables::{NewTable, TableStore};
use super::users::{NewUser, Role, UserStore};
use super::{Database, StoreError};

const CATEGORIES: &[&str] = &[
    "BEBIDA", "COMIDA", "LANCHE", "SUCO", "TAPIOCA", "BALDE", "CERVEJA", "SOBREMESA", "PIZZA",
    "MARMITEX", "OUTROS",
];

/// (name, address, phone, email, cnpj, invoice series, invoice number)
const COMPANIES: &[(&str, &str, &str, &str, &str, &str, &str)] = &[
    (
        "Choperia Point do Morro",
        "Avenida Cumbica, 784 Vila Gilda 04954-203 Bairro Bom / SP",
        "945876323",
        "choperia@example.net",
        "57.851.872/3504-08",
        "CHOP-001",
        "1001",
    ),
    (
        "Choperia do Zé",
        "Rua A, 123",
        "123456789",
        "choperia@example.com",
        "12345678000100",
        "CHOP-101",
        "2351",
    ),
    (
        "Bar do João",
        "Rua B, 456",
        "987654321",
        "joao@example.com",
        "12345678000200",
        "BAR-001",
        "2001",
    ),
];

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    cost_cents: i64,
    price_cents: i64,
    code: &'static str,
    stock: i64,
    category: &'static str,
    style: Option<&'static str>,
    abv: Option<f64>,
    ibu: Option<i64>,
}

fn beer(
    name: &'static str,
    description: &'static str,
    cost_cents: i64,
    price_cents: i64,
    code: &'static str,
    stock: i64,
    style: &'static str,
    abv: f64,
    ibu: i64,
) -> SeedProduct {
    SeedProduct {
        name,
        description,
        cost_cents,
        price_cents,
        code,
        stock,
        category: "CERVEJA",
        style: Some(style),
        abv: Some(abv),
        ibu: Some(ibu),
    }
}

fn item(
    name: &'static str,
    description: &'static str,
    cost_cents: i64,
    price_cents: i64,
    code: &'static str,
    stock: i64,
    category: &'static str,
) -> SeedProduct {
    SeedProduct {
        name,
        description,
        cost_cents,
        price_cents,
        code,
        stock,
        category,
        style: None,
        abv: None,
        ibu: None,
    }
}

fn products() -> Vec<SeedProduct> {
    vec![
        beer("Chopp Pilsen", "Chopp claro, leve e refrescante com notas sutis de malte", 890, 1290, "CHOP-001", 100, "Pilsen", 4.8, 12),
        beer("Chopp IPA", "Chopp aromático com notas cítricas e amargor pronunciado", 1090, 1590, "CHOP-002", 80, "IPA", 6.5, 60),
        beer("Chopp Weiss", "Chopp de trigo, refrescante com notas de banana e cravo", 990, 1490, "CHOP-003", 75, "Weiss", 5.2, 15),
        beer("Chopp Stout", "Chopp escuro, encorpado com notas de café e chocolate", 1190, 1690, "CHOP-004", 60, "Stout", 5.8, 35),
        beer("Chopp Red Ale", "Chopp vermelho com notas de caramelo e malte torrado", 1090, 1590, "CHOP-005", 70, "Red Ale", 5.5, 25),
        item("Porção de Batatas Fritas", "Batatas fritas crocantes com tempero especial da casa", 1590, 2590, "POR-001", 50, "COMIDA"),
        item("Tábua de Frios", "Seleção de queijos e frios premium", 4590, 6590, "TAB-001", 30, "COMIDA"),
        item("Isca de Peixe", "Iscas de peixe empanadas com molho tártaro", 3090, 4590, "ISC-001", 40, "COMIDA"),
        item("Pastéis Mistos", "Mix de pastéis com recheios variados (6 unidades)", 2590, 3590, "PAS-001", 45, "COMIDA"),
        item("Bolinho de Bacalhau", "Bolinhos de bacalhau tradicional português", 3290, 4290, "BOL-001", 40, "COMIDA"),
        item("Refrigerante Cola", "Refrigerante tipo cola 350ml", 390, 690, "BEB-001", 200, "BEBIDA"),
        item("Água Mineral", "Água mineral sem gás 500ml", 250, 500, "BEB-002", 250, "BEBIDA"),
        item("Suco de Laranja", "Suco natural de laranja 400ml", 490, 890, "SUC-001", 100, "SUCO"),
        item("Tapioca de Queijo", "Tapioca recheada com queijo coalho", 890, 1490, "TAP-001", 60, "TAPIOCA"),
        item("Pizza Margherita", "Molho de tomate, mussarela e manjericão", 2590, 3990, "PIZ-001", 40, "PIZZA"),
        item("Pizza Calabresa", "Calabresa fatiada com cebola", 2790, 4290, "PIZ-002", 35, "PIZZA"),
        item("Marmitex Executiva", "Arroz, feijão, carne e salada", 1590, 2590, "MAR-001", 30, "MARMITEX"),
        item("Balde de Cerveja", "Balde com 6 long necks", 4590, 6990, "BAL-001", 50, "BALDE"),
        item("Pudim de Leite", "Pudim de leite condensado", 890, 1490, "SOB-001", 25, "SOBREMESA"),
        item("X-Tudo", "Hambúrguer completo da casa", 1890, 2890, "LAN-001", 40, "LANCHE"),
    ]
}

/// (email, name, password, role)
const USERS: &[(&str, &str, &str, Role)] = &[
    ("admin@example.com", "Administrador", "admin123", Role::Admin),
    ("garcom@example.com", "Garçom", "garcom123", Role::Fisica),
    ("cliente@example.com", "Cliente", "cliente123", Role::Online),
];

/// Populate categories, companies, users, products and tables.
/// Does nothing when products already exist.
pub async fn seed(db: &Database) -> Result<(), StoreError> {
    let product_store = ProductStore::new(db.clone());
    if product_store.count().await? > 0 {
        info!("Database already populated, skipping seed");
        return Ok(());
    }

    let catalog = CatalogStore::new(db.clone());
    let mut category_ids = Vec::with_capacity(CATEGORIES.len());
    for name in CATEGORIES {
        let category = catalog
            .create_category(NewCategory {
                name: name.to_string(),
                description: None,
                active: true,
            })
            .await?;
        category_ids.push((*name, category.id));
    }

    let mut first_company = None;
    for (name, address, phone, email, cnpj, series, number) in COMPANIES {
        let company = catalog
            .create_company(NewCompany {
                name: name.to_string(),
                address: Some(address.to_string()),
                phone: Some(phone.to_string()),
                email: Some(email.to_string()),
                cnpj: cnpj.to_string(),
                slug: None,
            })
            .await?;
        catalog
            .create_invoice(
                company.id,
                NewInvoice {
                    series: series.to_string(),
                    number: number.to_string(),
                    description: Some("Nota fiscal inicial".to_string()),
                    issued_on: NaiveDate::from_ymd_opt(2025, 2, 9),
                },
            )
            .await?;
        first_company.get_or_insert(company.id);
    }

    let users = UserStore::new(db.clone());
    let mut admin_id = None;
    for (email, name, password, role) in USERS {
        if users.get_by_email(email).await?.is_some() {
            continue;
        }
        let user = users
            .create(NewUser {
                username: (*role == Role::Admin).then(|| "admin".to_string()),
                email: email.to_string(),
                name: name.to_string(),
                password: password.to_string(),
                role: *role,
            })
            .await?;
        if *role == Role::Admin {
            admin_id = Some(user.id);
        }
    }

    let catalog_products = products();
    for p in &catalog_products {
        let category_id = category_ids
            .iter()
            .find(|(name, _)| *name == p.category)
            .map(|(_, id)| *id)
            .ok_or_else(|| StoreError::not_found(format!("category {}", p.category)))?;
        product_store
            .create_with_origin(
                NewProduct {
                    name: p.name.to_string(),
                    category_id,
                    company_id: first_company,
                    description: Some(p.description.to_string()),
                    cost_cents: p.cost_cents,
                    price_cents: p.price_cents,
                    code: p.code.to_string(),
                    stock: p.stock,
                    available: true,
                    image: None,
                    style: p.style.map(str::to_string),
                    abv: p.abv,
                    ibu: p.ibu,
                },
                admin_id,
                MovementOrigin::Compra,
            )
            .await?;
    }

    let tables = TableStore::new(db.clone(), 12);
    for n in 1..=10 {
        tables
            .create(NewTable {
                name: format!("{:02}", n),
                capacity: Some(4),
                notes: None,
            })
            .await?;
    }
    for name in ["Balcão 1", "Balcão 2", "Entrega 1"] {
        tables
            .create(NewTable {
                name: name.to_string(),
                capacity: Some(1),
                notes: None,
            })
            .await?;
    }

    info!(
        categories = CATEGORIES.len(),
        companies = COMPANIES.len(),
        products = catalog_products.len(),
        "Database seeded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_db;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = test_db().await;
        seed(&db).await.unwrap();
        seed(&db).await.unwrap();

        assert_eq!(
            ProductStore::new(db.clone()).count().await.unwrap(),
            products().len() as i64
        );
        let tables = TableStore::new(db.clone(), 12).list().await.unwrap();
        assert_eq!(tables.len(), 13);
        assert_eq!(tables[0].table.slug, "Mesa-01");
        assert_eq!(tables[10].table.slug, "Balcao-1");

        let admin = UserStore::new(db)
            .get_by_username("admin")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
    }
}
