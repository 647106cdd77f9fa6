//! Macro-generated test suite for `Repository<T, S>` contract validation.
//!
//! The `repository_tests!` macro generates a test module that runs the
//! repository against any `DocumentStore`: CRUD with soft deletion, hidden
//! fields, both listing paths and the error surface.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod repository_harness;
//!
//! use repository_harness::*;
//! use tradebook::storage::InMemoryStore;
//!
//! repository_tests!(
//!     accounts: InMemoryStore::new("accounts").unique("login"),
//!     transactions: InMemoryStore::new("transactions"),
//! );
//! ```
//!
//! # Generated Tests
//!
//! ## CRUD
//! - `test_create_returns_stored_entity`: password never comes back
//! - `test_find_by_id_missing`: unknown id returns None
//! - `test_find_one_by_field`
//! - `test_find_all_skips_deleted`
//! - `test_projection_override`: caller projection replaces the default
//! - `test_update_changes_fields` / `test_update_missing`
//! - `test_update_skips_deleted_record`: deleted records stay deleted
//! - `test_delete_is_soft` / `test_delete_missing`
//!
//! ## Listing
//! - pagination, empty page, filters, sort, `or` groups, date operators,
//!   `like`, `in`, excluded fields and the aggregation path
//!
//! ## Errors & Concurrency
//! - disallowed filter fields, malformed sort, duplicate keys
//! - `test_concurrent_creates`: parallel creates from spawned tasks

/// Generate the repository conformance suite.
///
/// Both factories are re-evaluated for each test. The accounts store must
/// enforce a unique `login`; the store type must be `Clone + 'static` for the
/// concurrency test (shared state behind an `Arc`).
#[macro_export]
macro_rules! repository_tests {
    (accounts: $accounts:expr, transactions: $transactions:expr $(,)?) => {
        mod repository_contract_tests {
            use super::*;
            use mongodb::bson::doc;
            use mongodb::bson::oid::ObjectId;
            use tradebook::core::classify::Classifier;
            use tradebook::core::error::{ApiError, HttpException, QueryError};
            use tradebook::core::query::{PaginationResult, QueryParams, SortDirection, SortSpec};
            use tradebook::core::repository::{ListParams, Repository};
            use tradebook::entities::{TradingAccount, Transaction};
            use tradebook::storage::{ExecutionHints, StorageError};

            // ==================================================================
            // CRUD: Create & Read
            // ==================================================================

            #[tokio::test]
            async fn test_create_returns_stored_entity() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let account = sample_account("trader-1");
                let id = account.id;

                let created = accounts.create(&account).await.unwrap();
                assert_eq!(created.id, id);
                assert_eq!(created.login, "trader-1");
                assert_eq!(created.broker, "Acme Markets");
                assert!((created.balance - 1_000.0).abs() < f64::EPSILON);
                assert!(!created.is_deleted);
                assert!(created.password.is_none(), "password must never be returned");

                let fetched = accounts.find_by_id(&id, None).await.unwrap().unwrap();
                assert_eq!(fetched, created);
            }

            #[tokio::test]
            async fn test_find_by_id_missing() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                accounts.create(&sample_account("trader-1")).await.unwrap();

                let found = accounts.find_by_id(&ObjectId::new(), None).await.unwrap();
                assert!(found.is_none());
            }

            #[tokio::test]
            async fn test_find_one_by_field() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                for login in ["trader-1", "trader-2", "trader-3"] {
                    accounts.create(&sample_account(login)).await.unwrap();
                }

                let found = accounts
                    .find_one(doc! { "login": "trader-2" }, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(found.login, "trader-2");

                let none = accounts.find_one(doc! { "login": "nobody" }, None).await.unwrap();
                assert!(none.is_none());
            }

            #[tokio::test]
            async fn test_find_all_skips_deleted() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let mut ids = Vec::new();
                for login in ["trader-1", "trader-2", "trader-3"] {
                    ids.push(accounts.create(&sample_account(login)).await.unwrap().id);
                }
                accounts.delete(&ids[1]).await.unwrap().unwrap();

                let all = accounts.find_all(None).await.unwrap();
                assert_eq!(all.len(), 2);
                assert!(all.iter().all(|a| a.id != ids[1]));
                assert!(all.iter().all(|a| a.password.is_none()));
            }

            #[tokio::test]
            async fn test_projection_override() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let seeded = seed_transactions(&transactions, 1).await.unwrap();

                let found = transactions
                    .find_by_id(&seeded[0].id, Some(doc! { "note": 0 }))
                    .await
                    .unwrap()
                    .unwrap();
                assert!(found.note.is_none());
                assert_eq!(found.reference.as_deref(), Some("REF-001"));
            }

            // ==================================================================
            // CRUD: Update
            // ==================================================================

            #[tokio::test]
            async fn test_update_changes_fields() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let created = accounts.create(&sample_account("trader-1")).await.unwrap();

                let updated = accounts
                    .update(&created.id, &doc! { "status": "suspended", "balance": 50.0 })
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(updated.status, "suspended");
                assert!((updated.balance - 50.0).abs() < f64::EPSILON);
                assert_eq!(updated.login, "trader-1");
                assert!(updated.password.is_none());

                let fetched = accounts.find_by_id(&created.id, None).await.unwrap().unwrap();
                assert_eq!(fetched.status, "suspended");
            }

            #[tokio::test]
            async fn test_update_ignores_id_change() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let created = accounts.create(&sample_account("trader-1")).await.unwrap();

                let updated = accounts
                    .update(&created.id, &doc! { "_id": ObjectId::new(), "server": "Live-9" })
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(updated.id, created.id);
                assert_eq!(updated.server, "Live-9");
            }

            #[tokio::test]
            async fn test_update_missing() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let updated = accounts
                    .update(&ObjectId::new(), &doc! { "status": "closed" })
                    .await
                    .unwrap();
                assert!(updated.is_none());
            }

            #[tokio::test]
            async fn test_update_skips_deleted_record() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let created = accounts.create(&sample_account("trader-1")).await.unwrap();
                accounts.delete(&created.id).await.unwrap().unwrap();

                let updated = accounts
                    .update(&created.id, &doc! { "status": "active" })
                    .await
                    .unwrap();
                assert!(updated.is_none());
                assert!(accounts.find_by_id(&created.id, None).await.unwrap().is_none());

                let stored = accounts
                    .find_one(doc! { "_id": created.id, "isDeleted": true }, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(stored.status, created.status);
            }

            // ==================================================================
            // CRUD: Delete
            // ==================================================================

            #[tokio::test]
            async fn test_delete_is_soft() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let created = accounts.create(&sample_account("trader-1")).await.unwrap();

                let deleted = accounts.delete(&created.id).await.unwrap().unwrap();
                assert_eq!(deleted.id, created.id);
                assert!(deleted.is_deleted);
                assert!(deleted.password.is_none());

                assert!(accounts.find_by_id(&created.id, None).await.unwrap().is_none());

                // Still there when asked for explicitly
                let raw = accounts
                    .find_one(doc! { "_id": created.id, "isDeleted": true }, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert!(raw.is_deleted);

                // Deleting twice finds nothing live
                assert!(accounts.delete(&created.id).await.unwrap().is_none());
            }

            #[tokio::test]
            async fn test_delete_missing() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                assert!(accounts.delete(&ObjectId::new()).await.unwrap().is_none());
            }

            // ==================================================================
            // Listing: Pagination
            // ==================================================================

            #[tokio::test]
            async fn test_list_empty() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let params = ListParams::for_entity::<Transaction>(QueryParams::default());

                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();
                assert!(page.data.is_empty());
                assert_eq!(
                    page.pagination,
                    PaginationResult {
                        total_items: 0,
                        total_pages: 0,
                        current_page: 1,
                        page_size: 10,
                    }
                );
            }

            #[tokio::test]
            async fn test_list_paginates_newest_first() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_page("3", "10"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(
                    page.pagination,
                    PaginationResult {
                        total_items: 25,
                        total_pages: 3,
                        current_page: 3,
                        page_size: 10,
                    }
                );
                // Default sort is createdAt descending, so the last page holds the oldest
                assert_eq!(amounts(&page.data), vec![50.0, 40.0, 30.0, 20.0, 10.0]);
            }

            #[tokio::test]
            async fn test_list_invalid_page_falls_back() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 12).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_page("zero", "-4"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();
                assert_eq!(page.pagination.current_page, 1);
                assert_eq!(page.pagination.page_size, 10);
                assert_eq!(page.data.len(), 10);
            }

            #[tokio::test]
            async fn test_list_excludes_deleted() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let seeded = seed_transactions(&transactions, 5).await.unwrap();
                transactions.delete(&seeded[0].id).await.unwrap();
                transactions.delete(&seeded[3].id).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(QueryParams::default());
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();
                assert_eq!(page.pagination.total_items, 3);
                assert!(page.data.iter().all(|t| !t.is_deleted));
            }

            // ==================================================================
            // Listing: Filters & Sort
            // ==================================================================

            #[tokio::test]
            async fn test_list_filters_and_sorts() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default()
                        .with_filter("{'and':{'status':'completed','amount__gte':100}}")
                        .with_sort("+amount"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(page.pagination.total_items, 8);
                assert_eq!(
                    amounts(&page.data),
                    vec![100.0, 120.0, 140.0, 160.0, 180.0, 200.0, 220.0, 240.0]
                );
            }

            #[tokio::test]
            async fn test_list_multi_key_sort() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 6).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_sort("['+kind','-amount']"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                // deposit: 1, 4  fee: 3, 6  withdrawal: 2, 5
                assert_eq!(amounts(&page.data), vec![40.0, 10.0, 60.0, 30.0, 50.0, 20.0]);
            }

            #[tokio::test]
            async fn test_list_or_group() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default()
                        .with_filter("{'or':[{'kind':'withdrawal'},{'amount__lt':30}]}")
                        .with_page("1", "50"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                // withdrawal: 2, 5, .., 23 (8 items) plus amount 10 (n = 1)
                assert_eq!(page.pagination.total_items, 9);
                assert!(
                    page.data
                        .iter()
                        .all(|t| t.kind == "withdrawal" || t.amount < 30.0)
                );
            }

            #[tokio::test]
            async fn test_list_in_and_ne() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default()
                        .with_filter("{'and':{'kind__in':['deposit','fee'],'status__ne':'pending'}}")
                        .with_page("1", "50"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert!(page.data.iter().all(|t| t.kind != "withdrawal"));
                assert!(page.data.iter().all(|t| t.status == "completed"));
                // even n with n % 3 != 2: 4, 6, 10, 12, 16, 18, 22, 24
                assert_eq!(page.pagination.total_items, 8);
            }

            #[tokio::test]
            async fn test_list_day_filter() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_filter("{'and':{'createdAt__day':'2024-03-15'}}"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(page.pagination.total_items, 1);
                assert_eq!(page.data[0].reference.as_deref(), Some("REF-015"));
            }

            #[tokio::test]
            async fn test_list_month_filter() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                // March 1st through April 4th
                seed_transactions(&transactions, 35).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_filter("{'and':{'createdAt__month':'2024-04-01'}}"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(page.pagination.total_items, 4);
            }

            #[tokio::test]
            async fn test_list_like_is_case_insensitive() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default()
                        .with_filter("{'and':{'reference__like':'ref-01'}}")
                        .with_page("1", "50"),
                );
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(page.pagination.total_items, 10);
            }

            #[tokio::test]
            async fn test_list_filter_by_object_id() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let first = seed_transactions(&transactions, 3).await.unwrap();
                seed_transactions(&transactions, 4).await.unwrap();

                let filter = format!("{{'and':{{'account':'{}'}}}}", first[0].account.to_hex());
                let params =
                    ListParams::for_entity::<Transaction>(QueryParams::default().with_filter(filter));
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(page.pagination.total_items, 3);
                assert!(page.data.iter().all(|t| t.account == first[0].account));
            }

            #[tokio::test]
            async fn test_list_excluded_fields() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 3).await.unwrap();

                for params in [
                    ListParams::for_entity::<Transaction>(QueryParams::default()).exclude(["note"]),
                    ListParams::for_entity::<Transaction>(QueryParams::default())
                        .exclude(["note"])
                        .aggregated(Vec::new()),
                ] {
                    let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();
                    assert_eq!(page.data.len(), 3);
                    assert!(page.data.iter().all(|t| t.note.is_none()));
                    assert!(page.data.iter().all(|t| t.reference.is_some()));
                }
            }

            #[tokio::test]
            async fn test_list_never_returns_password() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                for login in ["trader-1", "trader-2"] {
                    accounts.create(&sample_account(login)).await.unwrap();
                }

                let params = ListParams::for_entity::<TradingAccount>(QueryParams::default());
                let page = accounts.list(&params, &ExecutionHints::default()).await.unwrap();
                assert_eq!(page.data.len(), 2);
                assert!(page.data.iter().all(|a| a.password.is_none()));
            }

            // ==================================================================
            // Listing: Aggregation
            // ==================================================================

            #[tokio::test]
            async fn test_list_aggregation_matches_find() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let query = QueryParams::default()
                    .with_filter("{'and':{'amount__gt':40}}")
                    .with_sort("-amount")
                    .with_page("2", "4");
                let plain = ListParams::for_entity::<Transaction>(query.clone());
                let aggregated = ListParams::for_entity::<Transaction>(query).aggregated(Vec::new());

                let by_find = transactions.list(&plain, &ExecutionHints::default()).await.unwrap();
                let by_pipeline =
                    transactions.list(&aggregated, &ExecutionHints::default()).await.unwrap();

                assert_eq!(by_find.pagination, by_pipeline.pagination);
                assert_eq!(by_find.data, by_pipeline.data);
                assert_eq!(amounts(&by_pipeline.data), vec![210.0, 200.0, 190.0, 180.0]);
                assert_eq!(by_pipeline.pagination.total_items, 21);
            }

            #[tokio::test]
            async fn test_list_ties_order_by_id_on_both_paths() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let account = ObjectId::new();
                let mut ids = Vec::new();
                for n in 1..=7 {
                    let tied = sample_transaction(account, n).created_at(noon(2024, 3, 1));
                    ids.push(transactions.create(&tied).await.unwrap().id);
                }
                ids.reverse();

                let mut by_find = Vec::new();
                for page in ["1", "2", "3"] {
                    let query = QueryParams::default().with_page(page, "3");
                    let plain = ListParams::for_entity::<Transaction>(query.clone());
                    let aggregated =
                        ListParams::for_entity::<Transaction>(query).aggregated(Vec::new());

                    let found = transactions.list(&plain, &ExecutionHints::default()).await.unwrap();
                    let piped =
                        transactions.list(&aggregated, &ExecutionHints::default()).await.unwrap();
                    assert_eq!(found.data, piped.data, "page {}", page);
                    by_find.extend(found.data.into_iter().map(|t| t.id));
                }

                assert_eq!(by_find, ids);
            }

            #[tokio::test]
            async fn test_list_aggregation_empty() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let params =
                    ListParams::for_entity::<Transaction>(QueryParams::default()).aggregated(Vec::new());

                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();
                assert!(page.data.is_empty());
                assert_eq!(page.pagination.total_items, 0);
                assert_eq!(page.pagination.total_pages, 0);
            }

            #[tokio::test]
            async fn test_list_aggregation_with_leading_stage() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 25).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_sort("+amount"),
                )
                .aggregated(vec![doc! { "$match": { "kind": "deposit" } }]);
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                // deposit is n % 3 == 1: 1, 4, .., 25
                assert_eq!(page.pagination.total_items, 9);
                assert_eq!(page.data[0].amount, 10.0);
                assert!(page.data.iter().all(|t| t.kind == "deposit"));
            }

            #[tokio::test]
            async fn test_list_custom_default_sort() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                seed_transactions(&transactions, 5).await.unwrap();

                let params = ListParams::for_entity::<Transaction>(QueryParams::default())
                    .default_sort(SortSpec::new().then("amount", SortDirection::Ascending))
                    .default_length(2);
                let page = transactions.list(&params, &ExecutionHints::default()).await.unwrap();

                assert_eq!(amounts(&page.data), vec![10.0, 20.0]);
                assert_eq!(page.pagination.total_pages, 3);
            }

            // ==================================================================
            // Errors
            // ==================================================================

            #[tokio::test]
            async fn test_list_rejects_unfilterable_field() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                let params = ListParams::for_entity::<TradingAccount>(
                    QueryParams::default().with_filter("{'and':{'password':'hunter2'}}"),
                );

                let err = accounts.list(&params, &ExecutionHints::default()).await.unwrap_err();
                let api = err.downcast_ref::<ApiError>().expect("ApiError");
                assert_eq!(api.status_code(), 400);
                match api {
                    ApiError::Query(QueryError::FieldNotFilterable { fields }) => {
                        assert_eq!(fields, &vec!["password".to_string()]);
                    }
                    other => panic!("unexpected error: {:?}", other),
                }
            }

            #[tokio::test]
            async fn test_list_rejects_malformed_sort() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let params = ListParams::for_entity::<Transaction>(
                    QueryParams::default().with_sort("['+amount'"),
                );

                let err = transactions.list(&params, &ExecutionHints::default()).await.unwrap_err();
                let api = err.downcast_ref::<ApiError>().expect("ApiError");
                assert_eq!(api.error_code(), "INVALID_SORT_FORMAT");
            }

            #[tokio::test]
            async fn test_duplicate_login_is_conflict() {
                let accounts = Repository::<TradingAccount, _>::new($accounts);
                accounts.create(&sample_account("trader-1")).await.unwrap();

                let err = accounts.create(&sample_account("trader-1")).await.unwrap_err();
                assert!(matches!(
                    err.downcast_ref::<StorageError>(),
                    Some(StorageError::DuplicateKey { .. })
                ));

                let record = Classifier::standard().classify_error(&err);
                assert_eq!(record.status(), 409);
                assert_eq!(record.error_type(), "DuplicateKeyError");
                assert_eq!(record.code(), Some("DUPLICATE_KEY"));
                let message = record.message().joined();
                assert!(message.contains("login"), "{}", message);
                assert!(message.contains("trader-1"), "{}", message);
            }

            // ==================================================================
            // Concurrency
            // ==================================================================

            #[tokio::test]
            async fn test_concurrent_creates() {
                let transactions = Repository::<Transaction, _>::new($transactions);
                let account = ObjectId::new();

                let mut handles = Vec::new();
                for n in 1..=10 {
                    let repo = transactions.clone();
                    handles.push(tokio::spawn(async move {
                        repo.create(&sample_transaction(account, n)).await
                    }));
                }
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }

                let all = transactions.find_all(None).await.unwrap();
                assert_eq!(all.len(), 10);
            }
        }
    };
}
