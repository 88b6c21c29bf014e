#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Extractors and row mappers wired through the component hub, resolved the way
//! a repository resolves its query methods.

use std::sync::Arc;

use rowkit::{
    ComponentHub, FromComponents, HubError, MaterializeError, Materializer, MaterializerRegistry,
    QueryMappingConfiguration, QueryMethod, ResultExtractor, Row, RowCursor, RowMapper,
    RowMapperExtractor, VecCursor, row_mapper_fn,
};

const CAR_MODEL: &str = "ResultSetExtractor Car";
const VALUE_PROCESSED_BY_SERVICE: &str = "Value Processed by Service";

#[derive(Clone, Debug, PartialEq)]
struct Car {
    id: Option<i64>,
    model: String,
}

trait CustomerService: Send + Sync {
    fn process(&self) -> String;
}

struct FixedCustomerService;

impl CustomerService for FixedCustomerService {
    fn process(&self) -> String {
        VALUE_PROCESSED_BY_SERVICE.to_owned()
    }
}

/// Ignores the rows and returns a fixed car.
struct CarExtractor;

impl FromComponents for CarExtractor {
    fn from_components(_hub: &ComponentHub) -> Result<Self, HubError> {
        Ok(Self)
    }
}

impl ResultExtractor<Vec<Car>> for CarExtractor {
    fn extract(&self, _cursor: &mut dyn RowCursor) -> rowkit::Result<Vec<Car>> {
        Ok(vec![Car {
            id: Some(1),
            model: CAR_MODEL.to_owned(),
        }])
    }
}

struct CarExtractorBean {
    customer_service: Arc<dyn CustomerService>,
}

impl FromComponents for CarExtractorBean {
    fn from_components(hub: &ComponentHub) -> Result<Self, HubError> {
        Ok(Self {
            customer_service: hub.get::<dyn CustomerService>()?,
        })
    }
}

impl ResultExtractor<Vec<Car>> for CarExtractorBean {
    fn extract(&self, _cursor: &mut dyn RowCursor) -> rowkit::Result<Vec<Car>> {
        Ok(vec![Car {
            id: Some(1),
            model: self.customer_service.process(),
        }])
    }
}

struct CustomRowMapperBean {
    customer_service: Arc<dyn CustomerService>,
}

impl FromComponents for CustomRowMapperBean {
    fn from_components(hub: &ComponentHub) -> Result<Self, HubError> {
        Ok(Self {
            customer_service: hub.get::<dyn CustomerService>()?,
        })
    }
}

impl RowMapper<String> for CustomRowMapperBean {
    fn map_row(&self, _row: &Row, _row_num: usize) -> rowkit::Result<String> {
        Ok(self.customer_service.process())
    }
}

fn car_rows() -> VecCursor {
    VecCursor::with_names(
        &["id", "model"],
        vec![vec![1_i64.into(), "Some model".into()]],
    )
}

fn default_car_mapper() -> Arc<dyn RowMapper<Car>> {
    row_mapper_fn(|row: &Row, _| {
        Ok(Car {
            id: row.get_by_name("id")?,
            model: row.get_by_name("model")?,
        })
    })
}

struct Fixture {
    registry: MaterializerRegistry,
    mapping: QueryMappingConfiguration,
}

fn fixture() -> Fixture {
    let hub = Arc::new(ComponentHub::new());
    hub.register::<dyn CustomerService>(Arc::new(FixedCustomerService));

    let mut builder = MaterializerRegistry::builder(hub);
    builder
        .register_extractor_type::<CarExtractor, Vec<Car>>()
        .unwrap()
        .register_extractor_bean::<CarExtractorBean, Vec<Car>>("CarResultSetExtractorBean")
        .unwrap()
        .register_row_mapper_bean::<CustomRowMapperBean, String>("CustomRowMapperBean")
        .unwrap();

    Fixture {
        registry: builder.build(),
        mapping: QueryMappingConfiguration::new().with_row_mapper(default_car_mapper()),
    }
}

#[test]
fn custom_find_all_uses_configured_extractor_type() {
    let f = fixture();
    let method = QueryMethod::new("select * from car").with_result_extractor_type::<CarExtractor>();

    let cars = f
        .mapping
        .resolve_extractor::<Vec<Car>>(&method, &f.registry)
        .unwrap()
        .materialize(&mut car_rows())
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(cars.len(), 1);
    assert!(cars.iter().all(|car| car.model == CAR_MODEL));
}

#[test]
fn row_mapper_bean_receives_injected_service() {
    let f = fixture();
    let method = QueryMethod::new("select model from car").with_row_mapper("CustomRowMapperBean");

    let names = f
        .mapping
        .resolve_rows::<String>(&method, &f.registry)
        .unwrap()
        .materialize(&mut car_rows())
        .unwrap()
        .into_rows();

    assert_eq!(names, vec![VALUE_PROCESSED_BY_SERVICE.to_owned()]);
}

#[test]
fn extractor_bean_receives_injected_service() {
    let f = fixture();
    let method =
        QueryMethod::new("select * from car").with_result_extractor("CarResultSetExtractorBean");

    let cars = f
        .mapping
        .resolve_extractor::<Vec<Car>>(&method, &f.registry)
        .unwrap()
        .materialize(&mut car_rows())
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(cars.len(), 1);
    assert!(cars.iter().all(|car| car.model == VALUE_PROCESSED_BY_SERVICE));
}

#[test]
fn default_row_mapper_gets_injected_into_extractor() {
    let f = fixture();

    let m = f
        .mapping
        .extractor_with_default_mapper::<RowMapperExtractor<Car>, Car, Vec<Car>>()
        .unwrap();
    assert!(matches!(m, Materializer::Extract(_)));

    let cars = m.materialize(&mut car_rows()).unwrap().into_single().unwrap();
    assert_eq!(
        cars,
        vec![Car {
            id: Some(1),
            model: "Some model".to_owned()
        }]
    );
}

#[test]
fn every_registered_key_resolves_to_declared_shape() {
    let f = fixture();
    for registration in f.registry.registrations() {
        assert!(f.registry.contains(&registration.key));
    }

    let mut rows = VecCursor::with_names(
        &["id", "model"],
        vec![
            vec![1_i64.into(), "a".into()],
            vec![2_i64.into(), "b".into()],
            vec![3_i64.into(), "c".into()],
        ],
    );
    let mapped = f
        .registry
        .resolve_named::<String>("CustomRowMapperBean")
        .unwrap()
        .materialize(&mut rows)
        .unwrap();
    assert_eq!(mapped.len(), 3);
}

#[test]
fn unknown_reference_fails_with_not_found() {
    let f = fixture();
    let method = QueryMethod::new("select * from car").with_row_mapper("NoSuchBean");
    let err = f.mapping.resolve_rows::<String>(&method, &f.registry).unwrap_err();
    assert!(matches!(err, MaterializeError::NotFound(_)));
}

#[test]
fn bean_without_its_service_cannot_be_registered() {
    let mut builder = MaterializerRegistry::builder(Arc::new(ComponentHub::new()));
    let err = builder
        .register_row_mapper_bean::<CustomRowMapperBean, String>("CustomRowMapperBean")
        .err()
        .unwrap();
    assert!(matches!(err, MaterializeError::Component(_)));
}
