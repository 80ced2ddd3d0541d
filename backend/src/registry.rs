//! Employee registry: sole owner of employee records and their payment ledgers.

use crate::binding::salary_context;
use crate::errors::PayrollError;
use crate::models::{Employee, EmployeeUpdate, Ledger, NewEmployee};
use chrono::{DateTime, Utc};
use payroll_zk::{Amount, ConfidentialityProvider, ProofToken, SealedValue, Statement};
use std::collections::HashMap;
use uuid::Uuid;

/// Registration input that passed validation but has not been sealed yet.
#[derive(Clone, Debug)]
pub struct ValidatedEmployee {
    pub name: String,
    pub role: String,
    pub wallet: String,
    pub salary: Amount,
}

/// Employer edit that passed validation.
#[derive(Clone, Debug, Default)]
pub struct ValidatedUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub salary: Option<Amount>,
}

/// A salary together with its sealed value and attestation.
#[derive(Clone, Debug)]
pub struct SealedSalary {
    pub salary: Amount,
    pub sealed: SealedValue,
    pub proof: ProofToken,
}

fn required(field: &str, value: &str) -> Result<String, PayrollError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PayrollError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn parse_salary(raw: &str) -> Result<Amount, PayrollError> {
    raw.parse::<Amount>()
        .map_err(|e| PayrollError::Validation(format!("salary: {e}")))
}

/// Seal and attest a salary for `wallet`. Pure provider work, no registry access.
pub fn seal_salary(
    provider: &dyn ConfidentialityProvider,
    wallet: &str,
    salary: Amount,
) -> Result<SealedSalary, PayrollError> {
    let sealed = provider.seal(salary, wallet)?;
    let context = salary_context(wallet, &sealed);
    let proof = provider.attest(Statement::Salary { amount: salary, context: &context })?;
    Ok(SealedSalary { salary, sealed, proof })
}

/// Build a fresh employee record (all counters zero) from validated input.
pub fn enroll(provider: &dyn ConfidentialityProvider, input: ValidatedEmployee) -> Result<Employee, PayrollError> {
    let sealed = seal_salary(provider, &input.wallet, input.salary)?;
    Ok(Employee {
        id: Uuid::new_v4(),
        name: input.name,
        role: input.role,
        wallet: input.wallet,
        salary: sealed.salary,
        sealed_salary: sealed.sealed,
        proof: sealed.proof,
        added_at: Utc::now(),
        total_paid: Amount::ZERO,
        payments_count: 0,
        last_paid_at: None,
    })
}

/// Employees in insertion order, indexed by id and by wallet.
///
/// Wallets are matched case-sensitively and exactly.
#[derive(Debug, Default)]
pub struct EmployeeRegistry {
    employees: Vec<Employee>,
    by_id: HashMap<Uuid, usize>,
    by_wallet: HashMap<String, usize>,
}

impl EmployeeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records, keeping their order.
    pub fn from_employees(employees: Vec<Employee>) -> Result<Self, PayrollError> {
        let mut registry = Self::new();
        for employee in employees {
            registry.insert(employee)?;
        }
        Ok(registry)
    }

    pub fn validate(&self, input: &NewEmployee) -> Result<ValidatedEmployee, PayrollError> {
        let validated = ValidatedEmployee {
            name: required("name", &input.name)?,
            role: required("role", &input.role)?,
            wallet: required("wallet", &input.wallet)?,
            salary: parse_salary(&required("salary", &input.salary)?)?,
        };
        if self.by_wallet.contains_key(&validated.wallet) {
            return Err(PayrollError::DuplicateWallet(validated.wallet));
        }
        Ok(validated)
    }

    pub fn validate_update(&self, id: Uuid, update: &EmployeeUpdate) -> Result<ValidatedUpdate, PayrollError> {
        if !self.by_id.contains_key(&id) {
            return Err(PayrollError::UnknownEmployee(id));
        }
        Ok(ValidatedUpdate {
            name: update.name.as_deref().map(|n| required("name", n)).transpose()?,
            role: update.role.as_deref().map(|r| required("role", r)).transpose()?,
            salary: update.salary.as_deref().map(parse_salary).transpose()?,
        })
    }

    /// Validate, seal and insert in one step.
    #[cfg(test)]
    pub(crate) fn register(&mut self, provider: &dyn ConfidentialityProvider, input: &NewEmployee) -> Result<&Employee, PayrollError> {
        let validated = self.validate(input)?;
        let employee = enroll(provider, validated)?;
        self.insert(employee)
    }

    /// Insert a sealed record. The wallet check is repeated because sealing happens outside the lock.
    pub fn insert(&mut self, employee: Employee) -> Result<&Employee, PayrollError> {
        if self.by_wallet.contains_key(&employee.wallet) {
            return Err(PayrollError::DuplicateWallet(employee.wallet));
        }
        let idx = self.employees.len();
        self.by_id.insert(employee.id, idx);
        self.by_wallet.insert(employee.wallet.clone(), idx);
        self.employees.push(employee);
        Ok(&self.employees[idx])
    }

    /// Apply a validated edit. A new salary must come with its fresh seal.
    pub fn apply_update(
        &mut self,
        id: Uuid,
        update: ValidatedUpdate,
        sealed: Option<SealedSalary>,
    ) -> Result<&Employee, PayrollError> {
        let idx = *self.by_id.get(&id).ok_or(PayrollError::UnknownEmployee(id))?;
        let employee = &mut self.employees[idx];
        if let Some(name) = update.name {
            employee.name = name;
        }
        if let Some(role) = update.role {
            employee.role = role;
        }
        if let Some(sealed) = sealed {
            employee.salary = sealed.salary;
            employee.sealed_salary = sealed.sealed;
            employee.proof = sealed.proof;
        }
        Ok(&self.employees[idx])
    }

    pub fn find_by_wallet(&self, wallet: &str) -> Option<&Employee> {
        self.by_wallet.get(wallet).map(|&i| &self.employees[i])
    }

    /// Registration index of `id`, the order `list_all` and batches use.
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, id: Uuid) -> Option<&Employee> {
        self.by_id.get(&id).map(|&i| &self.employees[i])
    }

    pub fn list_all(&self) -> &[Employee] {
        &self.employees
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    /// Owned copy for a payroll run; later edits never reach it.
    pub fn snapshot(&self) -> Vec<Employee> {
        self.employees.clone()
    }

    /// Credit every payment of a committed batch.
    ///
    /// Either every ledger is updated or none is. Paying an employee this registry does not own is
    /// a broken caller contract and panics.
    pub(crate) fn apply_payments(
        &mut self,
        payments: &[(Uuid, Amount)],
        paid_at: DateTime<Utc>,
    ) -> Result<Vec<Ledger>, PayrollError> {
        let mut updates = Vec::with_capacity(payments.len());
        for (id, amount) in payments {
            let idx = *self
                .by_id
                .get(id)
                .unwrap_or_else(|| panic!("payment for employee {id} not owned by this registry"));
            let total = self.employees[idx]
                .total_paid
                .checked_add(*amount)
                .ok_or(PayrollError::AmountOverflow)?;
            updates.push((idx, total));
        }

        let mut ledgers = Vec::with_capacity(updates.len());
        for (idx, total) in updates {
            let employee = &mut self.employees[idx];
            employee.total_paid = total;
            employee.payments_count += 1;
            employee.last_paid_at = Some(paid_at);
            ledgers.push(Ledger {
                employee_id: employee.id,
                total_paid: employee.total_paid,
                payments_count: employee.payments_count,
                last_paid_at: employee.last_paid_at,
            });
        }
        Ok(ledgers)
    }
}
