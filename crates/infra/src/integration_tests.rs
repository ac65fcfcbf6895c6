//! End-to-end scenarios of the shipping flow.
//!
//! Command → EventStore → services → job queue, checking:
//! - cash-on-delivery terms make a delivery invoiced at shipping
//! - the tracked cash-on-delivery invoices are exactly the flagged ones
//! - queued invoicing leaves the transfer untouched until its job has run
//! - routing-key uniqueness and address formatting through configuration

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use shipadvice_core::TenantId;
    use shipadvice_invoicing::InvoiceStatus;
    use shipadvice_parties::{
        Address, Contact, ContactId, Country, InvoicingMode, RegisterContact, RoutingRef, State,
    };
    use shipadvice_payment_terms::{ChangePolicy, CreatePaymentTerm, PaymentTermId, PaymentTermPolicy};
    use shipadvice_sales::{
        AddLine, ConfirmOrder, CreateSalesOrder, OrderCustomer, SalesOrder, SalesOrderCommand,
        SalesOrderId, SalesOrderStatus,
    };
    use shipadvice_stock::{
        DoneQuantity, InvoicingAtShipping, InvoicingOutcome, ShipmentAdviceId, ShipmentType,
        TransferId,
    };

    use crate::command_dispatcher::CommandDispatcher;
    use crate::config::{QUEUE_INVOICING_VAR, ROUTING_ADDRESS_FORMAT_VAR, ShipAdviceConfig};
    use crate::contacts::ContactService;
    use crate::event_store::InMemoryEventStore;
    use crate::jobs::{InMemoryJobStore, Job, JobExecutor, JobStore, JobWork, RetryPolicy};
    use crate::payment_terms::PaymentTermService;
    use crate::shipping::ShippingService;
    use crate::streams;

    type Store = InMemoryEventStore;
    type Jobs = Arc<InMemoryJobStore>;

    struct Harness {
        tenant_id: TenantId,
        dispatcher: Arc<CommandDispatcher<Store>>,
        contacts: ContactService<Store>,
        terms: PaymentTermService<Store>,
        shipping: Arc<ShippingService<Store, Jobs>>,
        executor: JobExecutor<Jobs, Arc<ShippingService<Store, Jobs>>>,
    }

    fn setup(config: ShipAdviceConfig) -> Harness {
        shipadvice_observability::init_for_tests("debug");

        let dispatcher = Arc::new(CommandDispatcher::new(InMemoryEventStore::new()));
        let jobs = InMemoryJobStore::arc();
        let template = config.routing_address_template().unwrap();
        let contacts = ContactService::new(dispatcher.clone(), template);
        let terms = PaymentTermService::new(dispatcher.clone());
        let shipping = Arc::new(ShippingService::new(dispatcher.clone(), jobs.clone(), &config));

        let executor = JobExecutor::new(jobs, shipping.clone());

        Harness {
            tenant_id: TenantId::new(),
            dispatcher,
            contacts,
            terms,
            shipping,
            executor,
        }
    }

    fn inline_invoicing() -> ShipAdviceConfig {
        ShipAdviceConfig {
            queue_invoicing: false,
            ..ShipAdviceConfig::default()
        }
    }

    impl Harness {
        fn payment_term(&self, name: &str, policy: PaymentTermPolicy) -> PaymentTermId {
            self.terms
                .create(CreatePaymentTerm {
                    tenant_id: self.tenant_id,
                    term_id: PaymentTermId::generate(),
                    name: name.to_string(),
                    policy,
                    occurred_at: Utc::now(),
                })
                .unwrap()
                .id_typed()
        }

        fn set_cash_on_delivery(&self, term_id: PaymentTermId, value: bool) {
            self.terms
                .change_policy(ChangePolicy {
                    tenant_id: self.tenant_id,
                    term_id,
                    cash_on_delivery: Some(value),
                    auto_validate_invoice: None,
                    occurred_at: Utc::now(),
                })
                .unwrap();
        }

        fn customer(&self, name: &str, invoicing_mode: InvoicingMode) -> Contact {
            self.contacts
                .register(RegisterContact {
                    tenant_id: self.tenant_id,
                    contact_id: ContactId::generate(),
                    name: name.to_string(),
                    invoicing_mode,
                    address: Address::default(),
                    routing: RoutingRef::default(),
                    occurred_at: Utc::now(),
                })
                .unwrap()
        }

        /// Confirmed order of `quantity` units of one product.
        fn order(&self, customer: &Contact, term: Option<PaymentTermId>, quantity: i64) -> SalesOrderId {
            let order_id = SalesOrderId::generate();
            let dispatch = |command: SalesOrderCommand| {
                self.dispatcher
                    .dispatch(
                        self.tenant_id,
                        order_id.aggregate_id(),
                        streams::SALES_ORDER,
                        command,
                        |_, id| SalesOrder::empty(SalesOrderId::new(id)),
                    )
                    .unwrap();
            };

            dispatch(SalesOrderCommand::CreateSalesOrder(CreateSalesOrder {
                tenant_id: self.tenant_id,
                order_id,
                customer: OrderCustomer {
                    contact_id: customer.id_typed(),
                    display_name: customer.name().to_string(),
                    invoicing_mode: customer.invoicing_mode(),
                },
                payment_term_id: term,
                occurred_at: Utc::now(),
            }));
            dispatch(SalesOrderCommand::AddLine(AddLine {
                tenant_id: self.tenant_id,
                order_id,
                product: "Product COD".to_string(),
                quantity,
                unit_price: 1_000,
                occurred_at: Utc::now(),
            }));
            dispatch(SalesOrderCommand::ConfirmOrder(ConfirmOrder {
                tenant_id: self.tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }));
            order_id
        }

        fn delivery(&self, order_id: SalesOrderId) -> TransferId {
            self.shipping
                .create_transfer_from_order(self.tenant_id, order_id, TransferId::generate())
                .unwrap()
                .id_typed()
        }
    }

    #[test]
    fn cash_on_delivery_order_is_invoiced_at_shipping_and_printable() {
        let h = setup(inline_invoicing());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::Standard);
        let order_id = h.order(&customer, Some(cod), 1);
        let transfer_id = h.delivery(order_id);

        let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
        let invoices = outcome.invoices().unwrap().to_vec();
        assert_eq!(invoices.len(), 1);

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(transfer.cash_on_delivery_invoice_ids(), invoices.as_slice());

        let invoice = h.shipping.load_invoice(h.tenant_id, invoices[0]).unwrap();
        assert_eq!(invoice.invoice_partner_display_name(), "Deco Addict");
        assert_eq!(invoice.invoice_payment_term_id(), Some(cod));
        assert_eq!(invoice.total_amount(), 1_000);

        let advice_id = ShipmentAdviceId::generate();
        h.shipping
            .create_shipment_advice(h.tenant_id, advice_id, ShipmentType::Outgoing)
            .unwrap();
        h.shipping
            .plan_transfers(h.tenant_id, advice_id, vec![transfer_id])
            .unwrap();

        let action = h
            .shipping
            .print_cash_on_delivery_invoices(h.tenant_id, advice_id)
            .unwrap();
        assert_eq!(action.action_type, "ir.actions.report");
        assert_eq!(action.report_name, "account.report_invoice");
        assert_eq!(action.report_type, "qweb-pdf");
        assert_eq!(action.active_ids(), invoices.as_slice());

        let order: SalesOrder = h
            .dispatcher
            .load(h.tenant_id, order_id.aggregate_id(), |_, id| {
                SalesOrder::empty(SalesOrderId::new(id))
            })
            .unwrap();
        assert_eq!(order.status(), SalesOrderStatus::Invoiced);
    }

    #[test]
    fn non_cash_on_delivery_term_leaves_tracked_set_empty() {
        let h = setup(inline_invoicing());
        let net30 = h.payment_term("30 days", PaymentTermPolicy::default());
        let customer = h.customer("Azure Interior", InvoicingMode::AtShipping);
        let transfer_id = h.delivery(h.order(&customer, Some(net30), 1));

        let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
        assert_eq!(outcome.invoices().map(<[_]>::len), Some(1));

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(transfer.invoice_ids().len(), 1);
        assert!(transfer.cash_on_delivery_invoice_ids().is_empty());
    }

    #[test]
    fn standard_customer_without_cash_on_delivery_is_not_invoiced() {
        let h = setup(inline_invoicing());
        let net30 = h.payment_term("30 days", PaymentTermPolicy::default());
        let customer = h.customer("Gemini Furniture", InvoicingMode::Standard);
        let transfer_id = h.delivery(h.order(&customer, Some(net30), 2));

        let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
        assert_eq!(outcome, InvoicingOutcome::Invoices(vec![]));

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert!(transfer.is_done());
        assert!(transfer.invoice_ids().is_empty());
    }

    #[test]
    fn rerunning_invoicing_leaves_an_ineligible_transfer_uninvoiced() {
        let h = setup(inline_invoicing());
        let net30 = h.payment_term("30 days", PaymentTermPolicy::default());
        let customer = h.customer("Gemini Furniture", InvoicingMode::Standard);
        let transfer_id = h.delivery(h.order(&customer, Some(net30), 2));
        h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();

        let again = h.shipping.invoicing_at_shipping(h.tenant_id, transfer_id).unwrap();
        assert_eq!(again, InvoicingOutcome::Invoices(vec![]));

        // Same through the job handler.
        h.shipping
            .jobs()
            .enqueue(Job::new(h.tenant_id, JobWork::InvoicingAtShipping { transfer_id }))
            .unwrap();
        assert_eq!(h.executor.run_pending(Some(h.tenant_id)).unwrap().succeeded, 1);

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert!(transfer.invoice_ids().is_empty());
        assert!(transfer.cash_on_delivery_invoice_ids().is_empty());
    }

    #[test]
    fn tracked_set_is_overwritten_when_the_term_changes() {
        let h = setup(inline_invoicing());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Azure Interior", InvoicingMode::AtShipping);
        let transfer_id = h.delivery(h.order(&customer, Some(cod), 1));

        let invoices = h
            .shipping
            .validate_transfer(h.tenant_id, transfer_id, None)
            .unwrap()
            .invoices()
            .unwrap()
            .to_vec();
        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(transfer.cash_on_delivery_invoice_ids(), invoices.as_slice());

        h.set_cash_on_delivery(cod, false);
        let again = h.shipping.invoicing_at_shipping(h.tenant_id, transfer_id).unwrap();
        assert_eq!(again.invoices(), Some(invoices.as_slice()));
        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(transfer.invoice_ids(), invoices.as_slice());
        assert!(transfer.cash_on_delivery_invoice_ids().is_empty());

        h.set_cash_on_delivery(cod, true);
        h.shipping.invoicing_at_shipping(h.tenant_id, transfer_id).unwrap();
        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(transfer.cash_on_delivery_invoice_ids(), invoices.as_slice());
    }

    #[test]
    fn policy_change_decides_eligibility_of_later_validations() {
        let h = setup(inline_invoicing());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::Standard);
        let transfer_id = h.delivery(h.order(&customer, Some(cod), 1));

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert!(h.shipping.invoicing().should_invoice_at_shipping(h.tenant_id, &transfer));

        h.set_cash_on_delivery(cod, false);
        assert!(!h.shipping.invoicing().should_invoice_at_shipping(h.tenant_id, &transfer));

        let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
        assert_eq!(outcome, InvoicingOutcome::Invoices(vec![]));
    }

    #[test]
    fn queued_invoicing_is_deferred_until_the_job_runs() {
        let h = setup(ShipAdviceConfig::default());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::AtShipping);
        let transfer_id = h.delivery(h.order(&customer, Some(cod), 1));

        let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
        let InvoicingOutcome::Deferred(job_id) = outcome else {
            panic!("expected deferred invoicing, got {outcome:?}");
        };

        let queued = h
            .shipping
            .jobs()
            .list(h.tenant_id, 10)
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id.to_string(), job_id);
        assert_eq!(queued[0].work, JobWork::InvoicingAtShipping { transfer_id });

        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert!(transfer.invoice_ids().is_empty());
        assert!(transfer.cash_on_delivery_invoice_ids().is_empty());

        let summary = h.executor.run_pending(Some(h.tenant_id)).unwrap();
        assert_eq!(summary.succeeded, 1);

        let again = h.shipping.invoicing_at_shipping(h.tenant_id, transfer_id).unwrap();
        let transfer = h.shipping.load_transfer(h.tenant_id, transfer_id).unwrap();
        assert_eq!(again.invoices(), Some(transfer.invoice_ids()));
        assert_eq!(transfer.invoice_ids().len(), 1);
        assert_eq!(transfer.cash_on_delivery_invoice_ids(), transfer.invoice_ids());
    }

    #[test]
    fn invoicing_job_for_unknown_transfer_is_dead_lettered() {
        let h = setup(ShipAdviceConfig::default());
        let job = Job::new(
            h.tenant_id,
            JobWork::InvoicingAtShipping {
                transfer_id: TransferId::generate(),
            },
        )
        .with_retry_policy(RetryPolicy::no_retry());
        h.shipping.jobs().enqueue(job).unwrap();

        let summary = h.executor.run_pending(Some(h.tenant_id)).unwrap();
        assert_eq!(summary.dead_lettered, 1);
        assert_eq!(h.shipping.jobs().dead_letters(h.tenant_id).unwrap().len(), 1);
    }

    #[test]
    fn auto_validated_term_posts_the_invoice() {
        let h = setup(inline_invoicing());
        let posted_term = h.payment_term(
            "Cash on delivery (auto)",
            PaymentTermPolicy::cash_on_delivery().with_auto_validate_invoice(true),
        );
        let draft_term = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::Standard);

        let posted = h.delivery(h.order(&customer, Some(posted_term), 1));
        let draft = h.delivery(h.order(&customer, Some(draft_term), 1));

        let status_of = |transfer_id| {
            let outcome = h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();
            let invoice_id = outcome.invoices().unwrap()[0];
            h.shipping.load_invoice(h.tenant_id, invoice_id).unwrap().status()
        };
        assert_eq!(status_of(posted), InvoiceStatus::Posted);
        assert_eq!(status_of(draft), InvoiceStatus::Draft);
    }

    #[test]
    fn partial_delivery_invoices_done_quantities_only() {
        let h = setup(inline_invoicing());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::Standard);
        let transfer_id = h.delivery(h.order(&customer, Some(cod), 5));

        let outcome = h
            .shipping
            .validate_transfer(
                h.tenant_id,
                transfer_id,
                Some(vec![DoneQuantity {
                    line_no: 1,
                    quantity_done: 2,
                }]),
            )
            .unwrap();

        let invoice = h
            .shipping
            .load_invoice(h.tenant_id, outcome.invoices().unwrap()[0])
            .unwrap();
        assert_eq!(invoice.lines()[0].quantity, 2);
        assert_eq!(invoice.total_amount(), 2_000);
    }

    #[test]
    fn duplicated_transfer_carries_no_invoices() {
        let h = setup(inline_invoicing());
        let cod = h.payment_term("Cash on delivery", PaymentTermPolicy::cash_on_delivery());
        let customer = h.customer("Deco Addict", InvoicingMode::Standard);
        let transfer_id = h.delivery(h.order(&customer, Some(cod), 1));
        h.shipping.validate_transfer(h.tenant_id, transfer_id, None).unwrap();

        let copy = h
            .shipping
            .duplicate_transfer(h.tenant_id, transfer_id, TransferId::generate())
            .unwrap();
        assert!(copy.invoice_ids().is_empty());
        assert!(copy.cash_on_delivery_invoice_ids().is_empty());
        assert!(!copy.has_done_quantity());
        assert_eq!(copy.payment_term_id(), Some(cod));
    }

    #[test]
    fn transfers_are_tenant_isolated() {
        let h = setup(inline_invoicing());
        let customer = h.customer("Deco Addict", InvoicingMode::AtShipping);
        let transfer_id = h.delivery(h.order(&customer, None, 1));

        let err = h
            .shipping
            .validate_transfer(TenantId::new(), transfer_id, None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn configured_address_format_and_key_guard() {
        let config = ShipAdviceConfig::from_lookup(|name| match name {
            n if n == ROUTING_ADDRESS_FORMAT_VAR => Some("{street}, {zip} {city}, {state_name}, {country_code}".to_string()),
            n if n == QUEUE_INVOICING_VAR => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        let h = setup(config);

        let register = |name: &str, key: &str| {
            h.contacts.register(RegisterContact {
                tenant_id: h.tenant_id,
                contact_id: ContactId::generate(),
                name: name.to_string(),
                invoicing_mode: InvoicingMode::Standard,
                address: Address {
                    street: Some("4557 De Silva St".to_string()),
                    street2: None,
                    zip: Some("94538".to_string()),
                    city: Some("Fremont".to_string()),
                    state: Some(State {
                        code: "CA".to_string(),
                        name: "California".to_string(),
                    }),
                    country: Some(Country {
                        code: "US".to_string(),
                        name: "United States".to_string(),
                    }),
                },
                routing: RoutingRef {
                    external_id: None,
                    key: Some(key.to_string()),
                },
                occurred_at: Utc::now(),
            })
        };

        let contact = register("Gemini Furniture", "GEM-1").unwrap();
        assert_eq!(
            h.contacts
                .format_routing_address(h.tenant_id, contact.id_typed())
                .unwrap(),
            "4557 De Silva St, 94538 Fremont, California, US"
        );

        let err = register("Gemini Furniture (copy)", "GEM-1").unwrap_err();
        assert!(err.is_validation());
    }
}
