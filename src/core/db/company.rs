use std::future::Future;

#[derive(Debug, Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub website: Option<String>,
    pub project_count: u64,
    pub(super) _guard: (),
}

#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    pub name: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyUpdate {
    pub name: Option<String>,
    pub website: Option<Option<String>>,
}

pub trait CompanyRepository {
    fn get_companies(&self) -> impl Future<Output = anyhow::Result<Vec<Company>>> + Send;
    fn get_company_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = anyhow::Result<Option<Company>>> + Send;
    fn get_company_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Company>>> + Send;
    fn add_company(
        &self,
        company: &NewCompany,
    ) -> impl Future<Output = anyhow::Result<Company>> + Send;
    fn update_company(
        &self,
        company: &Company,
        update: &CompanyUpdate,
    ) -> impl Future<Output = anyhow::Result<Company>> + Send;
    /// Projects referencing the company keep existing with no company.
    fn delete_company(&self, company: Company) -> impl Future<Output = anyhow::Result<()>> + Send;
}
