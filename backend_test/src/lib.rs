use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies. Every test gets a server over its own empty in-memory store.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::store::Store`. Pass `admin` or `voter` to log the client in
/// first: `admin` uses the seeded default admin, `voter` registers the
/// example voter (with no category) and logs in as them.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the arguments to inject and reject invalid signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as admin/voter if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "admin" => quote! {
            let response = rocket_client
                .post(uri!(crate::api::auth::admin_login))
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::admin::AdminCredentials::example()).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), rocket::http::Status::Ok, "admin login failed");
        },
        Some(arg) if arg == "voter" => quote! {
            let credentials = crate::model::voter::VoterCredentials::example();
            store
                .put(
                    &crate::model::voter::Voter::path(&credentials.id),
                    &crate::model::voter::VoterCore::example("Example Voter", None),
                )
                .await
                .unwrap();

            let response = rocket_client
                .post(uri!(crate::api::auth::voter_login))
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(credentials).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), rocket::http::Status::Ok, "voter login failed");
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `voter`")
                .into_compile_error()
                .into();
        }
        None => TokenStream2::new(),
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["evote_backend"],
                None,
                None,
            );

            /// Test setup.
            async fn __backend_test_setup() -> (rocket::local::asynchronous::Client, crate::store::Store) {
                let store = crate::store::Store::memory();
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store(store.clone()),
                )
                .await
                .unwrap();

                { #maybe_login }

                (rocket_client, store)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (rocket_client, store) = __backend_test_setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject
/// unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_store = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // The last segment names the type however it was imported.
                let type_ident = type_path.path.segments.last().map(|s| &s.ident);
                match type_ident {
                    Some(ident) if ident == "Client" => {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    }
                    Some(ident) if ident == "Store" => {
                        if has_store {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Store`",
                            ));
                        }
                        has_store = true;
                        args.push(quote! { store });
                        continue;
                    }
                    _ => {}
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `store_ident: Store`",
        ));
    }

    Ok(args)
}
