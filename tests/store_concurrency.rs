//! Concurrent writers against a file-backed database with a real pool

use std::path::PathBuf;

use choperia_server::store::cart::CartOwner;
use choperia_server::store::catalog::NewCategory;
use choperia_server::store::stock::{MovementKind, MovementOrigin, MovementRequest};
use choperia_server::store::{CartStore, CatalogStore, Database, ProductStore, StockStore};

const CARTS: usize = 8;
const ADDS_PER_CART: usize = 20;

struct FileDb {
    db: Database,
    path: PathBuf,
}

impl FileDb {
    async fn open() -> Self {
        let path = std::env::temp_dir().join(format!("choperia-{}.db", uuid::Uuid::new_v4()));
        let db = Database::connect(&format!("sqlite://{}", path.display()), 8)
            .await
            .expect("file database");
        db.migrate().await.expect("schema");
        Self { db, path }
    }

    async fn product(&self, stock: i64) -> i64 {
        let category = CatalogStore::new(self.db.clone())
            .create_category(NewCategory {
                name: "BEBIDA".to_string(),
                description: None,
                active: true,
            })
            .await
            .expect("category");
        let product = ProductStore::new(self.db.clone())
            .create(
                serde_json::from_value(serde_json::json!({
                    "name": "Chopp Pilsen",
                    "category_id": category.id,
                    "price_cents": 1290,
                    "code": "CHP-001",
                    "stock": stock
                }))
                .expect("product body"),
                None,
            )
            .await
            .expect("product");
        product.id
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cart_adds_wait_for_the_lock() {
    let file = FileDb::open().await;
    let product_id = file.product(1000).await;
    let carts = CartStore::new(file.db.clone(), 30);

    let mut handles = Vec::new();
    for cart in 0..CARTS {
        for _ in 0..ADDS_PER_CART {
            let carts = carts.clone();
            let owner = CartOwner::Session(format!("sessao-{}", cart));
            handles.push(tokio::spawn(async move {
                carts.add_item(&owner, product_id, 1).await
            }));
        }
    }

    let mut failures = Vec::new();
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "{} adds failed: {:?}", failures.len(), failures.first());

    for cart in 0..CARTS {
        let view = carts
            .view(&CartOwner::Session(format!("sessao-{}", cart)))
            .await
            .unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, ADDS_PER_CART as i64);
        assert_eq!(view.total_cents, 1290 * ADDS_PER_CART as i64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_movements_are_not_lost() {
    let file = FileDb::open().await;
    let product_id = file.product(0).await;
    let stock = StockStore::new(file.db.clone());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let stock = stock.clone();
            tokio::spawn(async move {
                stock
                    .record(MovementRequest {
                        product_id,
                        kind: MovementKind::Entrada,
                        origin: MovementOrigin::Compra,
                        quantity: 2,
                        user_id: None,
                        notes: None,
                        order_id: None,
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let product = ProductStore::new(file.db.clone())
        .get(product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 100);
}
