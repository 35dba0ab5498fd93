use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{store::SupplierDirectory, Error};

use super::Client;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub rating: Option<f64>,
}

string_id! {
    /// Opaque supplier identifier.
    Id
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Filter {
    pub specialty: Option<String>,
}

impl Filter {
    pub fn matches(&self, supplier: &Supplier) -> bool {
        self.specialty.as_ref().map_or(true, |specialty| {
            supplier
                .specialties
                .iter()
                .any(|s| s.eq_ignore_ascii_case(specialty))
        })
    }
}

#[async_trait]
impl SupplierDirectory for Client {
    async fn get_supplier(&self, id: &Id) -> Result<Option<Supplier>, Error> {
        const SQL: &str = "SELECT id, name, specialties, rating \
                           FROM suppliers \
                           WHERE id = $1 \
                           LIMIT 1";
        Ok(self.inner.query_opt(SQL, &[id]).await?.map(|row| Supplier {
            id: row.get("id"),
            name: row.get("name"),
            specialties: row.get("specialties"),
            rating: row.get("rating"),
        }))
    }

    async fn list_suppliers(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Supplier>, Error> {
        const SQL: &str = "\
            SELECT id, name, specialties, rating \
            FROM suppliers \
            WHERE $1::TEXT IS NULL \
               OR EXISTS (SELECT 1 FROM unnest(specialties) s \
                          WHERE lower(s) = lower($1)) \
            ORDER BY rating DESC NULLS LAST, \
                     name";
        Ok(self
            .inner
            .query(SQL, &[&filter.specialty])
            .await?
            .into_iter()
            .map(|row| Supplier {
                id: row.get("id"),
                name: row.get("name"),
                specialties: row.get("specialties"),
                rating: row.get("rating"),
            })
            .collect())
    }
}
